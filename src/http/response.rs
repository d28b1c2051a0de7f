//! Locally generated responses.
//!
//! The proxy never interprets backend responses; the only response it
//! produces itself is the plain-text error sent when a request cannot be
//! framed.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A plain-text error response that closes the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: &'static str,
}

impl ErrorResponse {
    pub const BAD_REQUEST: ErrorResponse = ErrorResponse {
        status: 400,
        message: "Invalid Request",
    };

    /// Serialize status line, headers and body.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.message.as_bytes();
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.message,
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }
}

/// Write `response` to the client and flush it.
pub async fn write_error<W>(stream: &mut W, response: &ErrorResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&response.encode()).await?;
    stream.flush().await
}
