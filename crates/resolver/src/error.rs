use thiserror::Error;

use crate::trace::ResolutionTrace;

/// Failure of a single page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {url}")]
    Timeout { url: String },
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    pub fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("script decoding failed: {0}")]
pub struct DecodeError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("unrecognized page reference: {0}")]
    Unrecognized(String),
}

/// Why a page reference could not be resolved.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("no manifest found after {} strategies: {trace}", .trace.len())]
    NotFound { trace: ResolutionTrace },

    #[error("every fetch failed, last in {strategy}: {cause}")]
    TransportFailure {
        strategy: &'static str,
        cause: TransportError,
        trace: ResolutionTrace,
    },
}

impl ResolutionError {
    pub fn trace(&self) -> &ResolutionTrace {
        match self {
            Self::NotFound { trace } | Self::TransportFailure { trace, .. } => trace,
        }
    }
}
