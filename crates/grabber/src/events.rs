use std::sync::Arc;

use serde::Serialize;
use stream_resolver::ResolutionTrace;

use crate::session::SessionState;

/// Progress notifications of a download session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        state: SessionState,
    },
    Resolved {
        manifest_url: String,
        trace: ResolutionTrace,
    },
    ManifestReady {
        segments: usize,
        encrypted: bool,
        /// First segment index this session fetches; non-zero when resuming.
        resumed_from: usize,
    },
    SegmentWritten {
        index: usize,
        bytes: usize,
        segments_done: usize,
        total_segments: usize,
    },
    SegmentFailed {
        index: usize,
        error: String,
    },
    Finished {
        state: SessionState,
    },
}

pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Delivers events to the optional callback of a session.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    callback: Option<EventCallback>,
}

impl EventSink {
    pub(crate) fn new(callback: Option<EventCallback>) -> Self {
        Self { callback }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if let Some(callback) = &self.callback {
            callback(&event);
        }
    }
}
