//! Length-prefixed frame codec.
//!
//! ```text
//! +----------------+---------+---------------------+
//! | length: u32 BE | type: u8| payload: length B   |
//! +----------------+---------+---------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::observability::metrics;

/// Size of the fixed frame header (length + type).
pub const HEADER_LEN: usize = 5;

/// Default upper bound on a single payload (64 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Message type tag carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Raw HTTP request, ship → offshore.
    Request,
    /// Raw HTTP response, offshore → ship.
    Response,
    /// Any tag this side does not understand. The frame is still consumed.
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(val: u8) -> Self {
        match val {
            0 => MessageType::Request,
            1 => MessageType::Response,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Request => 0,
            MessageType::Response => 1,
            MessageType::Unknown(tag) => tag,
        }
    }
}

/// Errors produced while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream before a full frame arrived.
    #[error("connection closed while reading frame {0}")]
    ConnectionClosed(&'static str),

    /// Declared payload length exceeds the configured maximum.
    #[error("frame payload of {len} bytes exceeds limit of {max} bytes")]
    TooLarge { len: usize, max: usize },

    /// Payload does not fit the 32-bit length field.
    #[error("payload of {0} bytes cannot be framed")]
    Unencodable(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One unit of framed transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn request(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Request, payload)
    }

    pub fn response(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Response, payload)
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let len = u32::try_from(self.payload.len())
            .map_err(|_| FrameError::Unencodable(self.payload.len()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(len);
        buf.put_u8(self.kind.into());
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = frame.encode()?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;

    metrics::record_frame("sent", frame.payload.len());
    tracing::trace!(kind = ?frame.kind, len = frame.payload.len(), "Frame sent");
    Ok(())
}

/// Read exactly one frame.
///
/// Never reads past the end of the frame, so the stream can be handed to a
/// raw relay right after a call returns.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| closed_or_io(e, "header"))?;

    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let kind = MessageType::from(header[4]);

    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| closed_or_io(e, "payload"))?;

    metrics::record_frame("received", len);
    tracing::trace!(kind = ?kind, len, "Frame received");
    Ok(Frame {
        kind,
        payload: Bytes::from(payload),
    })
}

fn closed_or_io(err: std::io::Error, part: &'static str) -> FrameError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed(part)
    } else {
        FrameError::Io(err)
    }
}
