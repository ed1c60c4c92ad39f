// Download Session: owns one destination file and drives
// resolve -> parse -> schedule -> assemble to a terminal state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use playlist::{Manifest, ParseError, resolve_manifest};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use stream_resolver::{PageReference, Resolver};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::assembler::{Assembler, PartialWriter, fingerprint};
use crate::client::create_client;
use crate::config::DownloadOptions;
use crate::decryption::{DecryptionOffloader, KeyProvider, KeyStore};
use crate::error::{DownloadError, FetchError};
use crate::events::{EventSink, SessionEvent};
use crate::fetcher::{SegmentFetcher, SegmentJob};
use crate::scheduler::SegmentScheduler;
use crate::transport::{HttpTransport, Transport, TransportVariantSource, build_header_map};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Created,
    Resolving,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What a session downloads.
#[derive(Debug, Clone)]
pub enum DownloadSource {
    /// An HLS playlist URL, master or media.
    ManifestUrl(Url),
    /// An already parsed manifest.
    Manifest(Manifest),
    /// A content page, resolved through the session's resolver.
    Page(PageReference),
    /// A progressive file fetched as a single segment.
    Direct(Url),
}

impl DownloadSource {
    /// Playlist-looking URLs become [`ManifestUrl`](Self::ManifestUrl), anything else [`Direct`](Self::Direct).
    pub fn from_url(url: Url) -> Self {
        if playlist::looks_like_playlist_url(url.as_str()) {
            Self::ManifestUrl(url)
        } else {
            Self::Direct(url)
        }
    }
}

/// Terminal report of a session. Exactly one of `path` and `error` is set.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub path: Option<PathBuf>,
    pub error: Option<DownloadError>,
    /// The session ended because it was cancelled.
    pub stopped: bool,
}

impl DownloadOutcome {
    pub fn completed(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            error: None,
            stopped: false,
        }
    }

    pub fn failed(error: DownloadError) -> Self {
        Self {
            path: None,
            error: Some(error),
            stopped: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            path: None,
            error: Some(DownloadError::Cancelled),
            stopped: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.path.is_some() && self.error.is_none()
    }
}

impl Serialize for DownloadOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DownloadOutcome", 4)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("error", &self.error.as_ref().map(ToString::to_string))?;
        state.serialize_field("error_kind", &self.error.as_ref().map(DownloadError::kind))?;
        state.serialize_field("stopped", &self.stopped)?;
        state.end()
    }
}

/// Snapshot of a session's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub segments_done: usize,
    pub total_segments: usize,
    pub bytes_written: u64,
}

/// Observes and cancels a session from another task.
#[derive(Clone)]
pub struct SessionHandle {
    token: CancellationToken,
    state: watch::Receiver<SessionState>,
    status: Arc<Mutex<SessionStatus>>,
}

impl SessionHandle {
    /// Requests cancellation. Fetches in flight finish or time out; nothing
    /// new is dispatched.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn status(&self) -> SessionStatus {
        let mut status = *self.status.lock();
        status.state = self.state();
        status
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Waits until the session reaches a state matching `predicate`.
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> SessionState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(predicate).await.map(|state| *state);
        // The sender only goes away after the final state was published.
        reached.unwrap_or_else(|_| *rx.borrow())
    }

    pub async fn finished(&self) -> SessionState {
        self.wait_for_state(SessionState::is_terminal).await
    }
}

/// A session running on its own task.
pub struct RunningSession {
    pub handle: SessionHandle,
    pub join: JoinHandle<DownloadOutcome>,
}

pub struct DownloadSession {
    source: DownloadSource,
    destination: PathBuf,
    options: DownloadOptions,
    transport: Option<Arc<dyn Transport>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    resolver: Option<Arc<Resolver>>,
    events: EventSink,
    token: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    status: Arc<Mutex<SessionStatus>>,
}

impl DownloadSession {
    pub fn new(
        source: DownloadSource,
        destination: impl Into<PathBuf>,
        options: DownloadOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Created);
        Self {
            source,
            destination: destination.into(),
            options,
            transport: None,
            key_provider: None,
            resolver: None,
            events: EventSink::default(),
            token: CancellationToken::new(),
            state_tx,
            status: Arc::new(Mutex::new(SessionStatus::default())),
        }
    }

    /// Replaces the default `reqwest` transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Needed for [`DownloadSource::Page`].
    pub fn with_resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Ties the session to an external token, e.g. one shared by a batch.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn on_event(mut self, callback: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Self {
        self.events = EventSink::new(Some(Arc::new(callback)));
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            token: self.token.clone(),
            state: self.state_tx.subscribe(),
            status: Arc::clone(&self.status),
        }
    }

    /// Spawns the session on the current runtime.
    pub fn start(self) -> RunningSession {
        let handle = self.handle();
        let join = tokio::spawn(self.run());
        RunningSession { handle, join }
    }

    /// Drives the session to a terminal state.
    pub async fn run(self) -> DownloadOutcome {
        info!(destination = %self.destination.display(), "Download session started");
        let outcome = match self.execute().await {
            Ok(path) => {
                self.transition(SessionState::Completed);
                DownloadOutcome::completed(path)
            }
            Err(DownloadError::Cancelled) => {
                info!("Download session cancelled");
                self.transition(SessionState::Cancelled);
                DownloadOutcome::cancelled()
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Download session failed");
                self.transition(SessionState::Failed);
                DownloadOutcome::failed(e)
            }
        };
        self.events.emit(SessionEvent::Finished {
            state: *self.state_tx.borrow(),
        });
        outcome
    }

    fn transition(&self, state: SessionState) {
        debug!(%state, "session state");
        self.state_tx.send_replace(state);
        self.status.lock().state = state;
        self.events.emit(SessionEvent::StateChanged { state });
    }

    fn cancelled_or<T>(&self, err: impl Into<DownloadError>) -> Result<T, DownloadError> {
        if self.token.is_cancelled() {
            Err(DownloadError::Cancelled)
        } else {
            Err(err.into())
        }
    }

    async fn execute(&self) -> Result<PathBuf, DownloadError> {
        self.options.validate()?;

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(
                HttpTransport::new(create_client(&self.options.client)?)
                    .with_request_timeout(self.options.timeout_per_segment),
            ),
        };
        let mut headers = self.options.headers.clone();

        let manifest = match &self.source {
            DownloadSource::Manifest(manifest) => manifest.clone(),
            DownloadSource::Direct(url) => Manifest::direct(url.clone()),
            DownloadSource::ManifestUrl(url) => {
                self.load_manifest(&transport, url, &headers).await?
            }
            DownloadSource::Page(reference) => {
                let resolver = self.resolver.as_ref().ok_or(DownloadError::ResolverMissing)?;
                self.transition(SessionState::Resolving);

                let resolution = tokio::select! {
                    _ = self.token.cancelled() => return Err(DownloadError::Cancelled),
                    resolution = resolver.resolve(reference) => resolution?,
                };
                info!(
                    url = %resolution.manifest_url,
                    trace = %resolution.trace,
                    "Resolved page reference"
                );
                self.events.emit(SessionEvent::Resolved {
                    manifest_url: resolution.manifest_url.to_string(),
                    trace: resolution.trace.clone(),
                });

                if let Some(referer) = &resolution.referer
                    && !self.options.has_header("referer")
                {
                    headers.insert("Referer".to_string(), referer.clone());
                }
                if !self.options.has_header("origin") {
                    headers.insert("Origin".to_string(), resolution.origin.clone());
                }

                self.load_manifest(&transport, &resolution.manifest_url, &headers)
                    .await?
            }
        };

        if manifest.segments.is_empty() {
            return Err(ParseError::Empty.into());
        }
        if self.token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        self.download(transport, Arc::new(manifest), &headers).await
    }

    async fn load_manifest(
        &self,
        transport: &Arc<dyn Transport>,
        url: &Url,
        headers: &BTreeMap<String, String>,
    ) -> Result<Manifest, DownloadError> {
        let source = TransportVariantSource::new(
            Arc::clone(transport),
            build_header_map(headers),
            self.options.retry_policy(),
            self.token.clone(),
            self.options.timeout_per_segment,
        );

        let text = match source.fetch_text(url).await {
            Ok(text) => text,
            Err(FetchError::Cancelled) => return Err(DownloadError::Cancelled),
            Err(e) => return self.cancelled_or(DownloadError::manifest_fetch(url.as_str(), e)),
        };

        match resolve_manifest(&text, url, &source, self.options.variant_selection).await {
            Ok(manifest) => {
                info!(
                    url = %manifest.source_url,
                    segments = manifest.segments.len(),
                    variants = manifest.variants.len(),
                    encrypted = manifest.is_encrypted(),
                    "Manifest loaded"
                );
                Ok(manifest)
            }
            Err(e) => self.cancelled_or(e),
        }
    }

    async fn download(
        &self,
        transport: Arc<dyn Transport>,
        manifest: Arc<Manifest>,
        headers: &BTreeMap<String, String>,
    ) -> Result<PathBuf, DownloadError> {
        self.transition(SessionState::Downloading);

        let total = manifest.segments.len();
        let writer = PartialWriter::open(
            &self.destination,
            fingerprint(&manifest),
            self.options.resumable,
        )
        .await?;
        let start = writer.segments_written().min(total);
        {
            let mut status = self.status.lock();
            status.total_segments = total;
            status.segments_done = start;
            status.bytes_written = writer.bytes_written();
        }
        self.events.emit(SessionEvent::ManifestReady {
            segments: total,
            encrypted: manifest.is_encrypted(),
            resumed_from: start,
        });

        let header_map = build_header_map(headers);
        let keys = Arc::new(KeyStore::new(
            Arc::clone(&transport),
            header_map.clone(),
            self.key_provider.clone(),
            self.options.timeout_per_segment,
        ));
        let fetcher = Arc::new(SegmentFetcher::new(
            transport,
            Arc::clone(&manifest),
            keys,
            DecryptionOffloader::new(self.options.offload_decryption),
            header_map,
            self.options.timeout_per_segment,
        ));

        let jobs: Vec<SegmentJob> = manifest
            .segments
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, segment)| SegmentJob {
                index,
                segment: segment.clone(),
            })
            .collect();

        let (tx, rx) = mpsc::channel(self.options.concurrency.saturating_mul(2).max(1));
        let assembler = Assembler::new(writer, self.events.clone(), Arc::clone(&self.status), total);
        let assembler_task = tokio::spawn(assembler.run(rx));

        let scheduler = SegmentScheduler::new(
            fetcher,
            self.options.retry_policy(),
            self.options.concurrency,
            self.options.effective_reorder_window(),
            self.token.clone(),
        );
        let scheduled = scheduler.run(jobs, tx).await;

        let (writer, written) = assembler_task
            .await
            .map_err(|e| DownloadError::internal(format!("assembler task failed: {e}")))?;

        // A write failure is the root cause of any error the scheduler saw afterwards.
        let result = written.and(scheduled);
        match result {
            Ok(()) => writer.finish().await,
            Err(e) => {
                if let DownloadError::Segment { index, source } = &e {
                    self.events.emit(SessionEvent::SegmentFailed {
                        index: *index,
                        error: source.to_string(),
                    });
                }
                let keep = e.is_cancelled() || self.options.resumable;
                writer.abandon(keep).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Created.is_terminal());
        assert!(!SessionState::Resolving.is_terminal());
        assert!(!SessionState::Downloading.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }

    #[test]
    fn source_from_url() {
        let hls = Url::parse("https://cdn.example/live/index.m3u8?token=1").unwrap();
        let file = Url::parse("https://cdn.example/video.mp4").unwrap();
        assert!(matches!(DownloadSource::from_url(hls), DownloadSource::ManifestUrl(_)));
        assert!(matches!(DownloadSource::from_url(file), DownloadSource::Direct(_)));
    }

    #[test]
    fn outcome_serializes_error_kind() {
        let json = serde_json::to_value(DownloadOutcome::cancelled()).unwrap();
        assert_eq!(json["stopped"], true);
        assert_eq!(json["error_kind"], "cancelled");
        assert!(json["path"].is_null());
    }

    #[tokio::test]
    async fn invalid_options_fail_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.ts");
        let session = DownloadSession::new(
            DownloadSource::Direct(Url::parse("https://cdn.example/v.mp4").unwrap()),
            &dest,
            DownloadOptions::default().with_concurrency(0),
        );
        let handle = session.handle();
        let outcome = session.run().await;
        assert!(matches!(outcome.error, Some(DownloadError::InvalidOptions { .. })));
        assert_eq!(handle.state(), SessionState::Failed);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
