//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Status (status.rs):
//!     Stopped ⇄ Running, published to observers through a watch channel
//!
//! Shutdown (shutdown.rs):
//!     stop() → trigger → accept loop exits → handlers drain → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls ProxyServer::stop
//! ```
//!
//! # Design Decisions
//! - One cancellation signal, cloned into every task that blocks on I/O
//! - Shutdown has a grace period: handlers still running afterwards are aborted

pub mod shutdown;
pub mod signals;
pub mod status;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use status::ServerStatus;
