// Assembler: the single writer of a session's output file.

use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use playlist::Manifest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::events::{EventSink, SessionEvent};
use crate::scheduler::FetchedSegment;
use crate::session::SessionStatus;

/// `<dest>.partial`, where data lands until the download completes.
pub fn partial_path(destination: &Path) -> PathBuf {
    with_suffix(destination, ".partial")
}

/// `<dest>.partial.json`, the resume record of a resumable session.
pub fn resume_state_path(destination: &Path) -> PathBuf {
    with_suffix(destination, ".partial.json")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Identity of a manifest's segment list; a resume record only applies to
/// the manifest it was written for.
pub fn fingerprint(manifest: &Manifest) -> String {
    let mut hasher = Sha256::new();
    for segment in &manifest.segments {
        hasher.update(segment.url.as_str().as_bytes());
        if let Some(range) = segment.byte_range {
            hasher.update(range.offset.to_be_bytes());
            hasher.update(range.length.to_be_bytes());
        }
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub fingerprint: String,
    pub segments_written: usize,
    pub bytes_written: u64,
}

/// Append-only writer over `<dest>.partial`.
pub struct PartialWriter {
    destination: PathBuf,
    partial: PathBuf,
    state_path: PathBuf,
    file: File,
    fingerprint: String,
    resumable: bool,
    segments_written: usize,
    bytes_written: u64,
}

impl PartialWriter {
    /// Opens the partial file, continuing a previous run when `resumable` and
    /// a matching resume record exists. Otherwise starts from an empty file.
    pub async fn open(
        destination: &Path,
        fingerprint: String,
        resumable: bool,
    ) -> Result<Self, DownloadError> {
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(destination);
        let state_path = resume_state_path(destination);

        let resume = if resumable {
            Self::load_resume_state(&partial, &state_path, &fingerprint).await
        } else {
            None
        };

        let (file, segments_written, bytes_written) = match resume {
            Some(state) => {
                let mut file = OpenOptions::new().write(true).open(&partial).await?;
                // Anything past the recorded length was never acknowledged.
                file.set_len(state.bytes_written).await?;
                file.seek(SeekFrom::End(0)).await?;
                info!(
                    path = %partial.display(),
                    segments = state.segments_written,
                    bytes = state.bytes_written,
                    "Resuming partial download"
                );
                (file, state.segments_written, state.bytes_written)
            }
            None => {
                let file = File::create(&partial).await?;
                remove_if_exists(&state_path).await?;
                (file, 0, 0)
            }
        };

        Ok(Self {
            destination: destination.to_path_buf(),
            partial,
            state_path,
            file,
            fingerprint,
            resumable,
            segments_written,
            bytes_written,
        })
    }

    async fn load_resume_state(
        partial: &Path,
        state_path: &Path,
        fingerprint: &str,
    ) -> Option<ResumeState> {
        let raw = tokio::fs::read(state_path).await.ok()?;
        let state: ResumeState = match serde_json::from_slice(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %state_path.display(), error = %e, "Ignoring unreadable resume record");
                return None;
            }
        };
        if state.fingerprint != fingerprint {
            debug!("Resume record belongs to a different manifest");
            return None;
        }
        let on_disk = tokio::fs::metadata(partial).await.ok()?.len();
        if on_disk < state.bytes_written {
            warn!(
                on_disk,
                recorded = state.bytes_written,
                "Partial file shorter than its resume record; starting over"
            );
            return None;
        }
        Some(state)
    }

    pub fn segments_written(&self) -> usize {
        self.segments_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    pub async fn append(&mut self, data: &[u8]) -> Result<(), DownloadError> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.segments_written += 1;
        self.bytes_written += data.len() as u64;

        if self.resumable {
            let state = ResumeState {
                fingerprint: self.fingerprint.clone(),
                segments_written: self.segments_written,
                bytes_written: self.bytes_written,
            };
            let json = serde_json::to_vec(&state)
                .map_err(|e| DownloadError::internal(format!("resume record: {e}")))?;
            tokio::fs::write(&self.state_path, json).await?;
        }
        Ok(())
    }

    /// Syncs the data and moves the partial file to the destination.
    pub async fn finish(mut self) -> Result<PathBuf, DownloadError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        tokio::fs::rename(&self.partial, &self.destination).await?;
        remove_if_exists(&self.state_path).await?;
        info!(path = %self.destination.display(), bytes = self.bytes_written, "Download complete");
        Ok(self.destination)
    }

    /// Leaves the partial output behind when `keep`, removes it otherwise.
    pub async fn abandon(mut self, keep: bool) {
        if let Err(e) = self.file.flush().await {
            warn!(error = %e, "Failed to flush partial file");
        }
        drop(self.file);
        if keep {
            debug!(path = %self.partial.display(), "Keeping partial output");
            return;
        }
        for path in [&self.partial, &self.state_path] {
            if let Err(e) = remove_if_exists(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove partial output");
            }
        }
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Consumes in-order segments and appends them.
pub struct Assembler {
    writer: PartialWriter,
    events: EventSink,
    status: Arc<Mutex<SessionStatus>>,
    total_segments: usize,
}

impl Assembler {
    pub(crate) fn new(
        writer: PartialWriter,
        events: EventSink,
        status: Arc<Mutex<SessionStatus>>,
        total_segments: usize,
    ) -> Self {
        Self {
            writer,
            events,
            status,
            total_segments,
        }
    }

    /// Runs until the channel closes or a write fails. The writer is handed
    /// back so the session can finish or abandon the file.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<FetchedSegment>,
    ) -> (PartialWriter, Result<(), DownloadError>) {
        while let Some(segment) = input.recv().await {
            if let Err(e) = self.writer.append(&segment.data).await {
                warn!(index = segment.index, error = %e, "Failed to append segment");
                return (self.writer, Err(e));
            }

            let segments_done = self.writer.segments_written();
            {
                let mut status = self.status.lock();
                status.segments_done = segments_done;
                status.bytes_written = self.writer.bytes_written();
            }
            self.events.emit(SessionEvent::SegmentWritten {
                index: segment.index,
                bytes: segment.data.len(),
                segments_done,
                total_segments: self.total_segments,
            });
        }
        (self.writer, Ok(()))
    }
}
