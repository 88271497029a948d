//! Length-prefixed envelope framing.
//!
//! Every frame on the wire is `[0x0D][u32 LE body_length][body_length bytes]`.
//! `FrameReader` accumulates bytes from an `AsyncRead` across however many
//! partial reads the transport hands back and yields one complete body per
//! call, keeping any bytes read past the current frame for the next call so
//! pipelined messages on one connection don't get dropped on the floor.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Marks the start of every frame.
pub const MARKER: u8 = 0x0D;

/// `marker(1) + body_length(4)`.
pub const HEADER_SIZE: usize = 5;

/// Total framed size cap, header included.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// `byte[0] != MARKER`.
    BadMarker,
    /// `body_length + HEADER_SIZE > MAX_FRAME_SIZE`.
    FrameTooLarge,
    /// A zero-byte read: the peer closed the connection in an orderly way.
    Closed,
}

impl std::error::Error for FrameError {}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMarker => write!(f, "bad frame marker"),
            Self::FrameTooLarge => write!(f, "frame exceeds max_frame_size"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

/// Read side of the frame codec.
///
/// One `FrameReader` per connection. `read_frame` is cancellation-safe in
/// the sense the caller cares about here: if the future is dropped while
/// suspended on the socket read, the partially filled internal buffer is
/// simply dropped along with the reader, which is correct because the
/// connection is being torn down anyway.
#[derive(Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_SIZE),
        }
    }

    /// Read exactly one framed body from `stream`, returning the bytes
    /// between the header and the next frame boundary.
    pub async fn read_frame<R>(&mut self, stream: &mut R) -> Result<Bytes, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        while self.buf.len() < HEADER_SIZE {
            if self.fill(stream).await? == 0 {
                return Err(FrameError::Closed);
            }
        }

        if self.buf[0] != MARKER {
            return Err(FrameError::BadMarker);
        }

        let body_len = u32::from_le_bytes(self.buf[1..HEADER_SIZE].try_into().unwrap()) as usize;
        if body_len + HEADER_SIZE > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge);
        }

        while self.buf.len() < HEADER_SIZE + body_len {
            if self.fill(stream).await? == 0 {
                return Err(FrameError::Closed);
            }
        }

        self.buf.advance(HEADER_SIZE);
        Ok(self.buf.split_to(body_len).freeze())
    }

    async fn fill<R>(&mut self, stream: &mut R) -> Result<usize, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.map_err(|_| FrameError::Closed)?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

/// Serialize `body` with its envelope header and write it under the
/// caller-held write lock (the caller is responsible for serializing
/// concurrent writers on the same stream, see `Session::write_mutex`).
pub async fn write_frame<W>(stream: &mut W, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = BytesMut::with_capacity(HEADER_SIZE + body.len());
    framed.put_u8(MARKER);
    framed.put_u32_le(body.len() as u32);
    framed.extend_from_slice(body);

    stream.write_all(&framed).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_back_what_was_written() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let payload = b"hello world".to_vec();
        let payload_clone = payload.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut client, &payload_clone).await.unwrap();
        });

        let mut reader = FrameReader::new();
        let got = reader.read_frame(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(&got[..], &payload[..]);
    }

    #[tokio::test]
    async fn rejects_bad_marker() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            client.write_all(&[0xAA, 0x01, 0x00, 0x00, 0x00]).await.unwrap();
        });

        let mut reader = FrameReader::new();
        assert_eq!(
            reader.read_frame(&mut server).await.unwrap_err(),
            FrameError::BadMarker
        );
    }

    #[tokio::test]
    async fn rejects_oversize_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            // body_length = 1_048_574 -> 1_048_574 + 5 > 1_048_576
            client
                .write_all(&[MARKER, 0xFE, 0xFF, 0x0F, 0x00])
                .await
                .unwrap();
        });

        let mut reader = FrameReader::new();
        assert_eq!(
            reader.read_frame(&mut server).await.unwrap_err(),
            FrameError::FrameTooLarge
        );
    }

    #[tokio::test]
    async fn resumes_partial_reads() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let body = vec![7u8; 40];
        let body_clone = body.clone();

        let writer = tokio::spawn(async move {
            // Dribble the frame out in small pieces.
            let mut framed = BytesMut::new();
            framed.put_u8(MARKER);
            framed.put_u32_le(body_clone.len() as u32);
            framed.extend_from_slice(&body_clone);

            for chunk in framed.chunks(3) {
                client.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut reader = FrameReader::new();
        let got = reader.read_frame(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(&got[..], &body[..]);
    }
}
