use thiserror::Error;

/// Errors produced while turning playlist text into a [`Manifest`](crate::Manifest).
///
/// None of these are retried: the same text always produces the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed playlist: {reason}")]
    Malformed { reason: String },

    #[error("playlist contains no segments")]
    Empty,

    #[error("playlist nesting exceeds {max_depth} levels")]
    TooDeep { max_depth: usize },

    #[error("master playlist has no selectable variant")]
    NoVariants,

    #[error("failed to load variant playlist {url}: {source}")]
    VariantFetch {
        url: String,
        #[source]
        source: SourceError,
    },
}

/// Why a [`VariantSource`](crate::VariantSource) could not deliver a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("transport failure: {reason}")]
    Transport { reason: String },

    #[error("fetch cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

impl ParseError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn variant_fetch(url: impl Into<String>, source: SourceError) -> Self {
        Self::VariantFetch {
            url: url.into(),
            source,
        }
    }
}
