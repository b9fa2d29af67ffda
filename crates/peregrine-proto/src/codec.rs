//! Message codec for async streams

use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum encoded message size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Encode a value with the configured serialization backend
pub fn to_wire<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    #[cfg(feature = "rmp-serde")]
    return rmp_serde::to_vec(value).map_err(|e| ProtocolError::Serialization(e.to_string()));

    #[cfg(all(not(feature = "rmp-serde"), feature = "bincode"))]
    return bincode::serialize(value).map_err(|e| ProtocolError::Serialization(e.to_string()));

    #[cfg(all(not(feature = "rmp-serde"), not(feature = "bincode")))]
    compile_error!("enable one of the `rmp-serde` or `bincode` features");
}

/// Decode a value with the configured serialization backend
pub fn from_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    #[cfg(feature = "rmp-serde")]
    return rmp_serde::from_slice(bytes).map_err(|e| ProtocolError::Serialization(e.to_string()));

    #[cfg(all(not(feature = "rmp-serde"), feature = "bincode"))]
    return bincode::deserialize(bytes).map_err(|e| ProtocolError::Serialization(e.to_string()));

    #[cfg(all(not(feature = "rmp-serde"), not(feature = "bincode")))]
    compile_error!("enable one of the `rmp-serde` or `bincode` features");
}

/// Codec for moving length-prefixed messages over async streams
///
/// Every message is a u32 big-endian length prefix followed by the encoded
/// body. The codec buffers partial reads internally until a complete message
/// is available.
pub struct MessageCodec {
    /// Read buffer for incoming data
    read_buf: BytesMut,
    /// Maximum message size allowed
    max_message_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec {
    /// Create a new codec with default settings
    pub fn new() -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Create a new codec with a custom max message size
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_message_size,
        }
    }

    /// Encode a message to bytes with length prefix
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<Bytes, ProtocolError> {
        let body = to_wire(message)?;

        if body.len() > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: body.len(),
                max: self.max_message_size,
            });
        }

        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);

        Ok(buf.freeze())
    }

    /// Write a message to an async writer
    pub async fn write_message<T, W>(&self, writer: &mut W, message: &T) -> Result<(), ProtocolError>
    where
        T: Serialize,
        W: AsyncWrite + Unpin,
    {
        let encoded = self.encode(message)?;
        writer
            .write_all(&encoded)
            .await
            .map_err(|e| ProtocolError::Serialization(format!("Write error: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| ProtocolError::Serialization(format!("Flush error: {}", e)))?;
        Ok(())
    }

    /// Read the next message from an async reader
    ///
    /// Returns `Ok(None)` on a clean end of stream. An end of stream in the
    /// middle of a message is a protocol error.
    pub async fn read_message<T, R>(&mut self, reader: &mut R) -> Result<Option<T>, ProtocolError>
    where
        T: DeserializeOwned,
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(message) = self.try_decode()? {
                return Ok(Some(message));
            }

            // Need more data, read from the stream
            let mut temp_buf = [0u8; 8192];
            let n = reader
                .read(&mut temp_buf)
                .await
                .map_err(|e| ProtocolError::Serialization(format!("Read error: {}", e)))?;

            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                } else {
                    return Err(ProtocolError::Truncated);
                }
            }

            self.read_buf.extend_from_slice(&temp_buf[..n]);
        }
    }

    /// Try to decode a message from the internal buffer
    pub fn try_decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        if self.read_buf.len() < 4 {
            // Not enough data for the length prefix
            return Ok(None);
        }

        let body_len = (&self.read_buf[..4]).get_u32() as usize;

        if body_len > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: body_len,
                max: self.max_message_size,
            });
        }

        if self.read_buf.len() < 4 + body_len {
            return Ok(None);
        }

        self.read_buf.advance(4);
        let body = self.read_buf.split_to(body_len);

        let message = from_wire(&body)?;
        Ok(Some(message))
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }
}
