//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (loopback only)
//!     → listener.rs (bind, accept, TCP_NODELAY)
//!     → connection.rs (connection ID, live-connection tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Each connection gets its own task and owns its socket until it closes
//! - Connection IDs tie every log line of a connection together

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
