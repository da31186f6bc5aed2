use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::{self, Codec, FrameError};
use crate::model::CodecKind;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("peer closed the connection")]
    Closed,
    #[error("peer closed mid-frame with {0} bytes buffered")]
    TruncatedFrame(usize),
}

/// A framed connection. Owned by exactly one task for its whole lifetime and
/// closed once, when dropped.
pub struct Connection {
    stream: TcpStream,
    codec: Box<dyn Codec>,
    rx: BytesMut,
}

impl Connection {
    pub async fn connect(
        addr: SocketAddr,
        kind: CodecKind,
        timeout: Duration,
    ) -> Result<Self, ProtoError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        Ok(Self::from_stream(stream, kind))
    }

    /// Wraps an already accepted stream; used on the server side.
    pub fn from_stream(stream: TcpStream, kind: CodecKind) -> Self {
        Self {
            stream,
            codec: codec::make(kind),
            rx: BytesMut::with_capacity(4096),
        }
    }

    pub async fn send(&mut self, payload: &str) -> Result<(), ProtoError> {
        let mut buf = BytesMut::new();
        self.codec.encode(payload, &mut buf);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Reads until the buffer holds one complete frame and returns its
    /// payload. A clean peer close with an empty buffer is `Closed`; a close
    /// with leftover bytes is `TruncatedFrame`.
    pub async fn recv(&mut self) -> Result<String, ProtoError> {
        loop {
            if let Some(payload) = self.codec.decode(&mut self.rx)? {
                return Ok(payload);
            }
            let n = self.stream.read_buf(&mut self.rx).await?;
            if n == 0 {
                return Err(if self.rx.is_empty() {
                    ProtoError::Closed
                } else {
                    ProtoError::TruncatedFrame(self.rx.len())
                });
            }
        }
    }
}
