use anyhow::Result;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Payload of a reply
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// A file sent with its known length
    File { file: tokio::fs::File, len: u64 },
    /// Output of unknown length, sent chunked
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Body {
    /// Collect the whole body in memory
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Body::Empty => {}
            Body::Bytes(bytes) => buf = bytes,
            Body::File { mut file, .. } => {
                file.read_to_end(&mut buf).await?;
            }
            Body::Stream(mut reader) => {
                reader.read_to_end(&mut buf).await?;
            }
        }
        Ok(buf)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::File { len, .. } => write!(f, "File({} bytes)", len),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A response, independent of the transport
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Body,
    /// Unix time for `Last-Modified`; the send time when absent
    pub mtime: Option<i64>,
}

impl Reply {
    pub fn xml(text: String) -> Self {
        Self::bytes("text/xml", text.into_bytes())
    }

    pub fn bytes(content_type: &'static str, bytes: Vec<u8>) -> Self {
        Self { status: 200, content_type, body: Body::Bytes(bytes), mtime: None }
    }

    pub fn file(content_type: &'static str, file: tokio::fs::File, len: u64) -> Self {
        Self { status: 200, content_type, body: Body::File { file, len }, mtime: None }
    }

    pub fn body(content_type: &'static str, body: Body) -> Self {
        Self { status: 200, content_type, body, mtime: None }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Body::Bytes(format!("{}\n", message).into_bytes()),
            mtime: None,
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::error(404, message)
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            411 => "Length Required",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}
