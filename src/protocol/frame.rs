//! Length-prefixed framing over TCP (§4.1).
//!
//! Each frame is a little-endian `u16` length `L` followed by exactly `L`
//! bytes of UTF-8 text. `"PING"` and `"END"` are control frames handled here,
//! below the JSON layer; everything else is handed up as raw text for
//! [`super::validation::MessageValidator`] to parse.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const MAX_FRAME_BYTES: usize = 65_535;
const PING_FRAME: &str = "PING";
const END_FRAME: &str = "END";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("peer closed the connection")]
    Closed,
    #[error("frame exceeds maximum size of {max} bytes")]
    Oversize { max: usize },
    #[error("frame was not valid UTF-8")]
    InvalidUtf8,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded frame, with control frames already stripped out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    End,
}

/// Reads and writes length-prefixed frames over an async byte stream,
/// transparently swallowing `PING` frames and surfacing `END` as [`Frame::End`].
pub struct FrameCodec<S> {
    stream: S,
}

impl<S> FrameCodec<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> FrameCodec<S>
where
    S: tokio::io::AsyncRead + Unpin,
{
    /// Reads the next non-`PING` frame. Retries internally on `PING`.
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        loop {
            let text = self.read_raw().await?;
            if text == PING_FRAME {
                continue;
            }
            if text == END_FRAME {
                return Ok(Frame::End);
            }
            return Ok(Frame::Text(text));
        }
    }

    async fn read_raw(&mut self) -> Result<String, FrameError> {
        let mut len_buf = [0u8; 2];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
                _ => FrameError::Io(err),
            })?;
        let len = u16::from_le_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        self.stream
            .read_exact(&mut body)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
                _ => FrameError::Io(err),
            })?;

        String::from_utf8(body).map_err(|_| FrameError::InvalidUtf8)
    }
}

impl<S> FrameCodec<S>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    /// Writes a single text frame. Rejects payloads over [`MAX_FRAME_BYTES`].
    pub async fn write_frame(&mut self, text: &str) -> Result<(), FrameError> {
        let bytes = text.as_bytes();
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(FrameError::Oversize {
                max: MAX_FRAME_BYTES,
            });
        }
        let len = bytes.len() as u16;
        self.stream.write_all(&len.to_le_bytes()).await?;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_text_frame() {
        let (client, server) = duplex(4096);
        let mut client_codec = FrameCodec::new(client);
        let mut server_codec = FrameCodec::new(server);

        client_codec.write_frame(r#"{"hello":"world"}"#).await.unwrap();
        let frame = server_codec.read_frame().await.unwrap();
        assert_eq!(frame, Frame::Text(r#"{"hello":"world"}"#.to_string()));
    }

    #[tokio::test]
    async fn ping_is_silently_consumed() {
        let (client, server) = duplex(4096);
        let mut client_codec = FrameCodec::new(client);
        let mut server_codec = FrameCodec::new(server);

        client_codec.write_frame(PING_FRAME).await.unwrap();
        client_codec.write_frame("actual message").await.unwrap();

        let frame = server_codec.read_frame().await.unwrap();
        assert_eq!(frame, Frame::Text("actual message".to_string()));
    }

    #[tokio::test]
    async fn end_frame_is_surfaced() {
        let (client, server) = duplex(4096);
        let mut client_codec = FrameCodec::new(client);
        let mut server_codec = FrameCodec::new(server);

        client_codec.write_frame(END_FRAME).await.unwrap();
        let frame = server_codec.read_frame().await.unwrap();
        assert_eq!(frame, Frame::End);
    }

    #[tokio::test]
    async fn oversize_write_is_rejected() {
        let (client, _server) = duplex(4096);
        let mut client_codec = FrameCodec::new(client);
        let oversize = "x".repeat(MAX_FRAME_BYTES + 1);
        let result = client_codec.write_frame(&oversize).await;
        assert!(matches!(result, Err(FrameError::Oversize { .. })));
    }

    #[tokio::test]
    async fn short_read_closes_connection() {
        let (client, server) = duplex(4096);
        drop(client);
        let mut server_codec = FrameCodec::new(server);
        let result = server_codec.read_frame().await;
        assert!(matches!(result, Err(FrameError::Closed)));
    }
}
