use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid reference: {0}")]
    Reference(#[from] stream_resolver::ReferenceError),

    #[error("Download error: {0}")]
    Download(#[from] grabber_engine::DownloadError),
}
