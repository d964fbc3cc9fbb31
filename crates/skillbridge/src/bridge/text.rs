//! Length-prefixed text channel toward the simulator.
//!
//! Inbound frames are `<decimal length>\n<body>`; the simulator has no other way
//! to mark the end of a result, so the length is always read first. Outbound
//! expressions are written verbatim and flushed, with no framing added.

use std::borrow::Cow;
use std::fmt;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use super::error::ChannelError;

/// Longest length header accepted before the line must have ended.
const MAX_HEADER_LEN: usize = 32;

/// Upper bound on buffer growth per decode call; the announced length is
/// untrusted until the bytes actually arrive.
const RESERVE_CHUNK: usize = 8 * 1024;

/// One frame read from the simulator, trailing newline removed.
#[derive(Clone, PartialEq, Eq)]
pub struct TextFrame(Bytes);

impl TextFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view of the body.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for TextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextFrame").field(&self.text()).finish()
    }
}

impl From<&str> for TextFrame {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

/// Decoder for `<len>\n<body>` frames; encoder that passes text through untouched.
#[derive(Debug, Default)]
pub struct TextCodec {
    /// Body length announced by a header that has already been consumed.
    pending_len: Option<usize>,
}

impl TextCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_length(line: &[u8]) -> Result<usize, ChannelError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ChannelError::framing("length header is not ASCII"))?;
    text.trim()
        .parse::<usize>()
        .map_err(|_| ChannelError::framing(format!("invalid length header {:?}", text.trim_end())))
}

impl Decoder for TextCodec {
    type Item = TextFrame;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                    if src.len() > MAX_HEADER_LEN {
                        return Err(ChannelError::framing(format!(
                            "no newline within {} bytes of length header",
                            MAX_HEADER_LEN
                        )));
                    }
                    return Ok(None);
                };
                let line = src.split_to(newline + 1);
                let len = parse_length(&line[..newline])?;
                self.pending_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve((len - src.len()).min(RESERVE_CHUNK));
            return Ok(None);
        }

        self.pending_len = None;
        let mut body = src.split_to(len);
        if body.last() == Some(&b'\n') {
            body.truncate(len - 1);
        }
        tracing::trace!(frame_len = len, "Decoded text frame");
        Ok(Some(TextFrame(body.freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.pending_len {
            Some(expected) => Err(ChannelError::framing(format!(
                "stream ended after {} of {} body bytes",
                src.len(),
                expected
            ))),
            None if !src.is_empty() => Err(ChannelError::framing(format!(
                "stream ended inside length header {:?}",
                String::from_utf8_lossy(&src[..])
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<&str> for TextCodec {
    type Error = ChannelError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

/// The pair of simulator streams: results come in on `R`, expressions go out on `W`.
pub struct TextChannel<R, W> {
    reader: FramedRead<R, TextCodec>,
    writer: FramedWrite<W, TextCodec>,
}

impl<R, W> TextChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, TextCodec::new()),
            writer: FramedWrite::new(writer, TextCodec::new()),
        }
    }

    /// Write an expression verbatim and flush it.
    pub async fn send_text(&mut self, expression: &str) -> Result<(), ChannelError> {
        tracing::debug!(expression, "Sending expression to simulator");
        self.writer.send(expression).await
    }

    /// Block until one complete frame has arrived.
    pub async fn recv_text(&mut self) -> Result<TextFrame, ChannelError> {
        match self.reader.next().await {
            Some(frame) => frame,
            None => Err(ChannelError::framing(
                "simulator stream closed before a length header",
            )),
        }
    }

    /// Flush and shut down the outbound stream.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.writer.close().await
    }
}

/// Channel over this process's own stdin/stdout, as wired up by the simulator.
pub fn stdio() -> TextChannel<tokio::io::Stdin, tokio::io::Stdout> {
    TextChannel::new(tokio::io::stdin(), tokio::io::stdout())
}
