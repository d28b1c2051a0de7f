//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, per-connection task)
//!     → request.rs (frame request line, headers, Content-Length body)
//!     → [transform rewrites POST bodies]
//!     → forward.rs (fresh backend connection, regenerated hop-by-hop headers)
//!     → backend response bytes relayed verbatim to the client
//!
//! Unframeable requests:
//!     → response.rs (400 Invalid Request, connection closed)
//! ```
//!
//! Only HTTP/1.x with `Content-Length` bodies is understood. Each client
//! connection carries exactly one request.

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder, HOP_BY_HOP_HEADERS};
pub use request::{read_request, FramingError, Header, ParsedRequest};
pub use response::ErrorResponse;
pub use server::{ProxyServer, ServerError};
