//! Framed JSON codec for the optimizer socket.
//!
//! Uses LengthDelimitedCodec for framing (4-byte big-endian length) + serde_json
//! for serialization. Works over any AsyncRead/AsyncWrite.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::error::ChannelError;

const HEADER_LEN: usize = 4;

/// Codec that frames messages with a length prefix and serializes with JSON.
///
/// The header is limited only by its own width, so any payload that fits in a
/// `u32` length is accepted.
pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    /// Set once a header has been consumed and its body is still outstanding.
    pending_len: Option<usize>,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(HEADER_LEN)
                .big_endian()
                .max_frame_length(u32::MAX as usize)
                .new_codec(),
            pending_len: None,
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = T;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending_len.is_none() && src.len() >= HEADER_LEN {
            let mut header = [0u8; HEADER_LEN];
            header.copy_from_slice(&src[..HEADER_LEN]);
            self.pending_len = Some(u32::from_be_bytes(header) as usize);
        }

        match self.inner.decode(src)? {
            Some(bytes) => {
                self.pending_len = None;
                let item = serde_json::from_slice(&bytes).map_err(ChannelError::Deserialization)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        match self.pending_len {
            Some(expected) => Err(ChannelError::broken(format!(
                "stream closed after {} of {} body bytes",
                src.len(),
                expected
            ))),
            None if !src.is_empty() => Err(ChannelError::broken(format!(
                "stream closed inside a {}-byte length header ({} bytes received)",
                HEADER_LEN,
                src.len()
            ))),
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = ChannelError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(ChannelError::Serialization)?;
        let json_len = json.len();
        tracing::trace!(json_size_bytes = json_len, "Encoding frame");
        if json_len > 100_000 {
            tracing::debug!(
                json_size_bytes = json_len,
                json_size_kb = json_len / 1024,
                "Large frame being encoded"
            );
        }
        self.inner.encode(Bytes::from(json), dst)?;
        Ok(())
    }
}
