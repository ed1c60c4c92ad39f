use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found { url: String },
    NoMatch,
    Transport { cause: String },
}

/// One strategy run during a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionAttempt {
    pub strategy: &'static str,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Ordered log of every strategy tried for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolutionTrace {
    attempts: Vec<ExtractionAttempt>,
}

impl ResolutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, strategy: &'static str, outcome: AttemptOutcome) {
        self.attempts.push(ExtractionAttempt { strategy, outcome });
    }

    pub fn attempts(&self) -> &[ExtractionAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&ExtractionAttempt> {
        self.attempts.last()
    }

    /// Strategy names in the order they ran.
    pub fn strategies(&self) -> Vec<&'static str> {
        self.attempts.iter().map(|a| a.strategy).collect()
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Found { .. } => f.write_str("found"),
            AttemptOutcome::NoMatch => f.write_str("no-match"),
            AttemptOutcome::Transport { cause } => write!(f, "transport({cause})"),
        }
    }
}

impl fmt::Display for ResolutionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, attempt) in self.attempts.iter().enumerate() {
            if idx > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}:{}", attempt.strategy, attempt.outcome)?;
        }
        Ok(())
    }
}
