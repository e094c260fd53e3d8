use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::stats::{SessionMonitor, SessionStats};

/// Registry-facing view of a running session
#[derive(Clone)]
pub struct SessionHandle {
    monitor: Arc<SessionMonitor>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub(crate) fn new(monitor: Arc<SessionMonitor>, shutdown: Arc<watch::Sender<bool>>) -> Self {
        Self { monitor, shutdown }
    }

    pub fn session_id(&self) -> &str {
        self.monitor.session_id()
    }

    pub fn stats(&self) -> SessionStats {
        self.monitor.snapshot()
    }

    /// Ask the session to drain. Only the first call has an effect; it
    /// returns `true`.
    pub fn shutdown(&self) -> bool {
        let requested = self.shutdown.send_if_modified(|stop| {
            if *stop {
                false
            } else {
                *stop = true;
                true
            }
        });
        if requested {
            info!(session_id = %self.session_id(), "Session stop requested");
        }
        requested
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}
