//! Wire types for the optimizer socket.
//!
//! Both directions carry a JSON object `{"type": <string>, "data": <any>}`.
//! Requests are kept as raw values until the translator has checked them, so a
//! request of unknown kind is a rejected command rather than a decode failure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of the `error` reply sent when a request cannot be translated.
pub const REJECTED_REQUEST_MESSAGE: &str = "There was an error while processing the sent data";

/// The three command kinds an optimizer may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Info,
    LoadSimulator,
    UpdateAndRun,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::LoadSimulator => "loadSimulator",
            Self::UpdateAndRun => "updateAndRun",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised request kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl FromStr for RequestKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "loadSimulator" => Ok(Self::LoadSimulator),
            "updateAndRun" => Ok(Self::UpdateAndRun),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// A request that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: RequestKind,
    pub data: Value,
}

/// Kind tag of a message sent to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyKind {
    /// Handshake traffic and simulator output that matched no command.
    Info,
    LoadSimulator,
    UpdateAndRun,
    /// The request could not be translated; the session stays open.
    Error,
}

/// Message from the bridge to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    pub data: Value,
}

impl Reply {
    pub fn new(kind: ReplyKind, data: Value) -> Self {
        Self { kind, data }
    }

    pub fn info(data: impl Into<Value>) -> Self {
        Self::new(ReplyKind::Info, data.into())
    }

    pub fn rejected() -> Self {
        Self::new(ReplyKind::Error, Value::from(REJECTED_REQUEST_MESSAGE))
    }
}
