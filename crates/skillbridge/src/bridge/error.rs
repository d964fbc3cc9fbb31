//! Errors shared by the text and binary channels.

use std::io;

/// Failure while moving a frame across either channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Malformed length header or truncated body on the simulator stream.
    #[error("framing error: {0}")]
    Framing(String),

    /// The optimizer socket stopped delivering or accepting bytes mid-transfer.
    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    #[error("payload is not JSON-serializable: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("received data is not valid JSON: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl ChannelError {
    pub fn framing(message: impl Into<String>) -> Self {
        Self::Framing(message.into())
    }

    pub fn broken(message: impl Into<String>) -> Self {
        Self::ConnectionBroken(message.into())
    }
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WriteZero
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => Self::ConnectionBroken(e.to_string()),
            _ => Self::Io(e),
        }
    }
}
