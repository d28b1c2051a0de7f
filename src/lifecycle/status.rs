//! Server lifecycle state.
//!
//! # States
//! ```text
//! Stopped → Running: start() bound the listener
//! Running → Stopped: stop() released the listener and drained handlers
//! ```
//!
//! Every transition is published to observers; repeated start/stop calls in
//! the same state publish nothing.

/// Whether the proxy is accepting connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ServerStatus {
    #[default]
    Stopped,
    Running,
}

impl ServerStatus {
    pub fn is_running(self) -> bool {
        matches!(self, ServerStatus::Running)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Stopped => write!(f, "stopped"),
            ServerStatus::Running => write!(f, "running"),
        }
    }
}

impl From<ServerStatus> for bool {
    fn from(status: ServerStatus) -> Self {
        status.is_running()
    }
}
