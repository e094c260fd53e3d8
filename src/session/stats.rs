use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::state::SessionState;
use crate::audio::RelayCounters;

/// Statistics about a live transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the session was accepted
    pub started_at: DateTime<Utc>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Inbound binary frames
    pub chunks_received: usize,

    pub bytes_received: usize,

    /// Result messages delivered to the client
    pub results_sent: usize,

    /// Chunks dropped because they arrived after the end marker
    pub chunks_rejected_after_end: usize,
}

/// Live counters shared between the coordinator and the session registry
#[derive(Debug)]
pub struct SessionMonitor {
    session_id: String,
    started_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    chunks_received: AtomicUsize,
    bytes_received: AtomicUsize,
    results_sent: AtomicUsize,
    relay: Mutex<Option<Arc<RelayCounters>>>,
}

impl SessionMonitor {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            state: Mutex::new(SessionState::Accepted),
            chunks_received: AtomicUsize::new(0),
            bytes_received: AtomicUsize::new(0),
            results_sent: AtomicUsize::new(0),
            relay: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn attach_relay(&self, counters: Arc<RelayCounters>) {
        *self.relay.lock() = Some(counters);
    }

    pub(crate) fn record_chunk(&self, bytes: usize) {
        self.chunks_received.fetch_add(1, Ordering::SeqCst);
        self.bytes_received.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn record_result(&self) {
        self.results_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let rejected = self
            .relay
            .lock()
            .as_ref()
            .map(|c| c.rejected_after_end())
            .unwrap_or(0);

        SessionStats {
            session_id: self.session_id.clone(),
            state: self.state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_received: self.chunks_received.load(Ordering::SeqCst),
            bytes_received: self.bytes_received.load(Ordering::SeqCst),
            results_sent: self.results_sent.load(Ordering::SeqCst),
            chunks_rejected_after_end: rejected,
        }
    }
}
