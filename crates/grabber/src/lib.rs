//! Segmented download engine.
//!
//! A [`DownloadSession`] takes a [`DownloadSource`] (page reference, playlist
//! URL, parsed manifest or plain file URL) to a single output file. Segments
//! are fetched concurrently with per-segment retries and written strictly in
//! manifest order through `<dest>.partial`, which is renamed into place only
//! once every segment landed.

pub mod assembler;
pub mod client;
pub mod config;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod transport;

use std::path::PathBuf;

pub use config::{ClientConfig, DownloadOptions};
pub use decryption::KeyProvider;
pub use error::{DownloadError, ErrorKind, FetchError};
pub use events::{EventCallback, SessionEvent};
pub use retry::RetryPolicy;
pub use session::{
    DownloadOutcome, DownloadSession, DownloadSource, RunningSession, SessionHandle, SessionState,
    SessionStatus,
};
pub use transport::{HttpTransport, Transport, TransportRequest};

/// Downloads `source` to `destination` with the default transport.
///
/// Page sources need a resolver; use [`DownloadSession::with_resolver`] for those.
pub async fn download(
    source: DownloadSource,
    destination: impl Into<PathBuf>,
    options: DownloadOptions,
) -> DownloadOutcome {
    DownloadSession::new(source, destination, options).run().await
}
