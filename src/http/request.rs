//! Request framing.
//!
//! # Responsibilities
//! - Accumulate bytes until the `\r\n\r\n` head terminator
//! - Parse the request line and `name: value` header lines
//! - Read a `Content-Length` delimited body
//!
//! # Design Decisions
//! - A close before the terminator is "no request", not an error
//! - A close mid-body truncates the body instead of failing
//! - No chunked decoding: without `Content-Length` the body is empty
//! - The head is bounded by `max_header_bytes`

use tokio::io::{AsyncRead, AsyncReadExt};

use thiserror::Error;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 8192;

/// Errors raised while framing a request.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The request line did not contain method, path and version.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    /// The head is larger than the configured limit.
    #[error("request head exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },

    /// Reading from the client failed.
    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
}

impl FramingError {
    /// Whether the client should get a `400` before the connection closes.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, FramingError::Io(_))
    }
}

/// A single header line, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// ASCII case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// One framed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    method: String,
    path: String,
    version: String,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ParsedRequest {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Headers in arrival order, duplicates included.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// First header with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.is(name))
            .map(|header| header.value.as_str())
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }
}

/// The request line and headers of a request, before its body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<Header>,
}

impl RequestHead {
    /// Parse a head block (terminator optional).
    pub fn parse(bytes: &[u8]) -> Result<Self, FramingError> {
        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut tokens = request_line.split_whitespace();
        let (Some(method), Some(path), Some(version)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(FramingError::MalformedRequestLine(request_line.to_string()));
        };

        let headers = lines
            .take_while(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some(Header::new(name.trim(), value.trim()))
            })
            .collect();

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Declared body length.
    ///
    /// The first `Content-Length` whose value is a 32-bit integer decides;
    /// later duplicates are ignored. Zero, negative or missing means no body.
    pub fn content_length(&self) -> usize {
        self.headers
            .iter()
            .filter(|header| header.is("content-length"))
            .find_map(|header| header.value.parse::<i32>().ok())
            .and_then(|length| usize::try_from(length).ok())
            .unwrap_or(0)
    }
}

/// Read one request from `stream`.
///
/// Returns `Ok(None)` when the peer closes before a complete head arrives.
pub async fn read_request<R>(
    stream: &mut R,
    max_header_bytes: usize,
) -> Result<Option<ParsedRequest>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let mut scanned = 0;

    let head_end = loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            tracing::trace!(buffered = buffer.len(), "Peer closed before request head");
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..read]);

        let terminator = find_terminator(&buffer, scanned);
        if terminator.unwrap_or(buffer.len()) > max_header_bytes {
            return Err(FramingError::HeadersTooLarge {
                limit: max_header_bytes,
            });
        }
        if let Some(at) = terminator {
            break at;
        }
        scanned = buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
    };

    let head = RequestHead::parse(&buffer[..head_end])?;
    let content_length = head.content_length();

    let mut body = buffer.split_off(head_end + HEADER_TERMINATOR.len());
    if body.len() < content_length {
        let remaining = (content_length - body.len()) as u64;
        (&mut *stream).take(remaining).read_to_end(&mut body).await?;
        if body.len() < content_length {
            tracing::debug!(
                expected = content_length,
                received = body.len(),
                "Client closed mid-body, forwarding truncated body"
            );
        }
    }
    body.truncate(content_length);

    Ok(Some(ParsedRequest {
        method: head.method,
        path: head.path,
        version: head.version,
        headers: head.headers,
        body,
    }))
}

fn find_terminator(buffer: &[u8], from: usize) -> Option<usize> {
    buffer[from..]
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|at| from + at)
}
