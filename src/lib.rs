//! Thinking-model intercepting proxy.
//!
//! Sits between a local client and a local LLM completion backend, turns
//! `claude-*-thinking-<budget>` model names into explicit thinking budgets,
//! and relays the backend's response untouched.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod transform;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::{ServerStatus, Shutdown};
