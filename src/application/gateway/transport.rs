use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines};
use tracing::debug;

/// One JSON-RPC 2.0 message as it crosses the child's stdio, newline-delimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl WireFrame {
    pub fn request(id: impl Into<Value>, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id.into()),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// A frame carrying a `method` originates with the peer rather than
    /// answering one of our requests.
    pub fn is_peer_initiated(&self) -> bool {
        self.method.is_some()
    }
}

/// A line read from the child that could not be decoded as a frame.
#[derive(Debug)]
pub enum Inbound {
    Frame(WireFrame),
    Malformed {
        line: String,
        source: serde_json::Error,
    },
}

pub struct FrameWriter<W> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::new(writer),
        }
    }

    pub async fn send(&mut self, frame: &WireFrame) -> io::Result<()> {
        let encoded = serde_json::to_string(frame)
            .map_err(|source| io::Error::new(io::ErrorKind::InvalidData, source))?;
        self.inner.write_all(encoded.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await
    }

    /// Close the underlying stream; for a child process stdin this signals a
    /// graceful shutdown.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

pub struct FrameReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Next decodable line; `Ok(None)` at end of stream. Blank lines and
    /// ANSI-decorated log lines some tool servers print are skipped.
    pub async fn next(&mut self) -> io::Result<Option<Inbound>> {
        while let Some(raw) = self.lines.next_line().await? {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(line = trimmed, "skipping ANSI log line from tool server");
                continue;
            }
            return Ok(Some(match serde_json::from_str::<WireFrame>(trimmed) {
                Ok(frame) => Inbound::Frame(frame),
                Err(source) => Inbound::Malformed { line: raw, source },
            }));
        }
        Ok(None)
    }
}
