//! Binary frame channel toward the optimizer.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::JsonCodec;
use super::error::ChannelError;

/// Framed JSON over one bidirectional stream (UNIX or TCP socket, or an in-memory pipe).
pub struct PeerChannel<S> {
    reader: FramedRead<ReadHalf<S>, JsonCodec<Value>>,
    writer: FramedWrite<WriteHalf<S>, JsonCodec<Value>>,
}

impl<S> PeerChannel<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read_half, JsonCodec::new()),
            writer: FramedWrite::new(write_half, JsonCodec::new()),
        }
    }

    /// Serialize `obj` and write it as one length-prefixed frame.
    pub async fn send_object<T: Serialize>(&mut self, obj: &T) -> Result<(), ChannelError> {
        let value = serde_json::to_value(obj).map_err(ChannelError::Serialization)?;
        self.writer.send(value).await
    }

    /// Read one complete frame and parse its JSON body.
    pub async fn recv_object(&mut self) -> Result<Value, ChannelError> {
        match self.recv_request().await? {
            Some(value) => Ok(value),
            None => Err(ChannelError::broken("optimizer closed the connection")),
        }
    }

    /// Like [`recv_object`](Self::recv_object), but a hangup on a frame
    /// boundary is `Ok(None)` rather than an error.
    pub async fn recv_request(&mut self) -> Result<Option<Value>, ChannelError> {
        self.reader.next().await.transpose()
    }

    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.writer.close().await
    }
}
