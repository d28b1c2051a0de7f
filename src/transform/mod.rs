//! Request body transformation subsystem.
//!
//! # Data Flow
//! ```text
//! POST body bytes
//!     → body.rs (typed CompletionRequest, unknown fields carried through)
//!     → thinking.rs (strip "-thinking-<budget>", add thinking + token limit)
//!     → TransformResult { body, modified }
//! ```
//!
//! # Design Decisions
//! - Pure and total: no I/O, no state, never returns an error
//! - Any parse failure fails open and forwards the original bytes
//! - Unmodified bodies are borrowed, never re-serialized

pub mod body;
pub mod thinking;

pub use body::CompletionRequest;
pub use thinking::{apply, ThinkingBudget, ThinkingDirective, TransformResult, HARD_CAP};
