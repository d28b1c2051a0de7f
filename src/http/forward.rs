//! Backend forwarding.
//!
//! # Responsibilities
//! - Open a fresh backend connection per request
//! - Re-emit the request line and end-to-end headers
//! - Regenerate hop-by-hop headers for the backend leg
//! - Relay the backend's response bytes to the client untouched
//!
//! # Design Decisions
//! - No pooling: `Connection: close` on every backend request
//! - No retries: a failed connect or copy ends the client connection
//! - The response is never parsed, so any framing the backend uses passes through

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::request::ParsedRequest;

/// Headers that are dropped from the client request and regenerated.
pub const HOP_BY_HOP_HEADERS: [&str; 4] =
    ["content-length", "host", "connection", "transfer-encoding"];

/// Errors raised while forwarding to the backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to connect to backend {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to backend {addr} after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    #[error("failed to send request to backend: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to relay backend response: {0}")]
    Relay(#[source] std::io::Error),
}

/// Forwards framed requests to a single backend.
#[derive(Debug, Clone)]
pub struct Forwarder {
    backend: SocketAddr,
    connect_timeout: Duration,
    nodelay: bool,
}

impl Forwarder {
    pub fn new(backend: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            backend,
            connect_timeout,
            nodelay: true,
        }
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn backend(&self) -> SocketAddr {
        self.backend
    }

    /// Build the request line and headers sent to the backend.
    pub fn encode_head(&self, request: &ParsedRequest, body_len: usize) -> Vec<u8> {
        let mut head = format!(
            "{} {} {}\r\n",
            request.method(),
            request.path(),
            request.version()
        );

        for header in request.headers() {
            if HOP_BY_HOP_HEADERS.iter().any(|name| header.is(name)) {
                continue;
            }
            head.push_str(&header.name);
            head.push_str(": ");
            head.push_str(&header.value);
            head.push_str("\r\n");
        }

        head.push_str(&format!("Host: {}\r\n", self.backend));
        head.push_str("Connection: close\r\n");
        head.push_str(&format!("Content-Length: {body_len}\r\n\r\n"));
        head.into_bytes()
    }

    /// Send `request` with `body` to the backend and copy the whole response
    /// into `client`. Returns the number of response bytes relayed.
    pub async fn forward<W>(
        &self,
        request: &ParsedRequest,
        body: &[u8],
        client: &mut W,
    ) -> Result<u64, ForwardError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut upstream = self.connect().await?;

        let head = self.encode_head(request, body.len());
        upstream.write_all(&head).await.map_err(ForwardError::Send)?;
        if !body.is_empty() {
            upstream.write_all(body).await.map_err(ForwardError::Send)?;
        }
        upstream.flush().await.map_err(ForwardError::Send)?;

        let relayed = tokio::io::copy(&mut upstream, client)
            .await
            .map_err(ForwardError::Relay)?;
        client.flush().await.map_err(ForwardError::Relay)?;

        tracing::trace!(backend = %self.backend, bytes = relayed, "Backend closed response stream");
        Ok(relayed)
    }

    async fn connect(&self) -> Result<TcpStream, ForwardError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.backend))
            .await
            .map_err(|_| ForwardError::ConnectTimeout {
                addr: self.backend,
                timeout: self.connect_timeout,
            })?
            .map_err(|source| ForwardError::Connect {
                addr: self.backend,
                source,
            })?;

        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY on backend stream");
            }
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::read_request;
    use tokio::net::TcpListener;

    async fn parsed(raw: &[u8]) -> ParsedRequest {
        let mut reader = raw;
        read_request(&mut reader, 4096).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn head_replaces_hop_by_hop_headers() {
        let request = parsed(
            b"POST /v1/messages?beta=true HTTP/1.1\r\nHOST: localhost:8317\r\nx-api-key: k\r\nconnection: keep-alive\r\nTransfer-Encoding: identity\r\nContent-Length: 3\r\nAccept: a\r\nAccept: b\r\n\r\nabc",
        )
        .await;
        let forwarder = Forwarder::new("127.0.0.1:8318".parse().unwrap(), Duration::from_secs(1));

        let head = forwarder.encode_head(&request, 42);
        assert_eq!(
            String::from_utf8(head).unwrap(),
            "POST /v1/messages?beta=true HTTP/1.1\r\n\
             x-api-key: k\r\n\
             Accept: a\r\n\
             Accept: b\r\n\
             Host: 127.0.0.1:8318\r\n\
             Connection: close\r\n\
             Content-Length: 42\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn relays_backend_bytes_verbatim() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = backend.local_addr().unwrap();
        let reply = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ndata\r\n0\r\n\r\n";

        let server = tokio::spawn(async move {
            let (mut socket, _) = backend.accept().await.unwrap();
            let received = read_request(&mut socket, 4096).await.unwrap().unwrap();
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            received
        });

        let request = parsed(b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").await;
        let forwarder = Forwarder::new(addr, Duration::from_secs(1));
        let mut client = Vec::new();

        let relayed = forwarder
            .forward(&request, b"rewritten", &mut client)
            .await
            .unwrap();

        assert_eq!(client, reply);
        assert_eq!(relayed, reply.len() as u64);

        let received = server.await.unwrap();
        assert_eq!(received.body(), b"rewritten");
        assert_eq!(received.header("content-length"), Some("9"));
        assert_eq!(received.header("host"), Some(addr.to_string().as_str()));
    }

    #[tokio::test]
    async fn unreachable_backend_is_connect_error() {
        let addr = {
            let vacated = TcpListener::bind("127.0.0.1:0").await.unwrap();
            vacated.local_addr().unwrap()
        };

        let request = parsed(b"GET / HTTP/1.1\r\n\r\n").await;
        let forwarder = Forwarder::new(addr, Duration::from_secs(1));
        let mut client = Vec::new();

        let err = forwarder.forward(&request, b"", &mut client).await.unwrap_err();
        assert!(matches!(err, ForwardError::Connect { .. }));
        assert!(client.is_empty());
    }
}
