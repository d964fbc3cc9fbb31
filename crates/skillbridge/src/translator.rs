//! Command translation between optimizer requests and simulator expressions.
//!
//! Request side: `{"type", "data"}` → SKILL expression (or the exit sentinel).
//! Response side: simulator text → `{"type", "data"}` reply, keyed on the
//! `*_OK` markers the simulator scripts print.
//!
//! Marker matching is by substring so log noise around the marker is tolerated.
//! That is only sound because a single request is in flight at a time.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::bridge::protocol::{Reply, ReplyKind, Request, RequestKind};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::store::{CollaboratorError, VariableStore};

pub const LOAD_SCRIPT_FILE: &str = "loadSimulator.ocn";
pub const INITIAL_VARS_FILE: &str = "vars.ocn";
pub const LOAD_OK_MARKER: &str = "loadSimulator_OK";
pub const RUN_OK_MARKER: &str = "updateAndRun_OK";
pub const INFO_PREFIX: &str = "[INFO from simulator] ";
/// Expression sent for a plain `info` request.
pub const INFO_EXPRESSION: &str = "info";
const EXIT_KEYWORD: &str = "exit";

/// Number of completed round trips; names the variables/results file pair of
/// the request in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestSeq(u64);

impl RequestSeq {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub(crate) fn advance(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Display for RequestSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("request is not a JSON object")]
    NotAnObject,

    #[error("request has no '{0}' key")]
    MissingField(&'static str),

    #[error("Invalid object type sent from the client: {0}")]
    UnknownType(String),

    #[error("invalid data for {kind} request: {reason}")]
    InvalidData {
        kind: RequestKind,
        reason: &'static str,
    },
}

/// What the session should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// End the session cleanly.
    Terminate,
    /// Send the expression; the simulator's answer is neither awaited nor forwarded.
    Notify { expression: String },
    /// Send the expression, wait for one text frame, reply to the optimizer.
    RoundTrip {
        kind: RequestKind,
        expression: String,
    },
}

impl Command {
    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Terminate => None,
            Self::Notify { expression } | Self::RoundTrip { expression, .. } => {
                Some(expression.as_str())
            }
        }
    }
}

/// Where the scripts, variables and results live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    pub script_dir: PathBuf,
    pub var_dir: PathBuf,
    pub result_dir: PathBuf,
}

impl FileLayout {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            script_dir: config.script_dir.clone(),
            var_dir: config.var_dir.clone(),
            result_dir: config.result_dir.clone(),
        }
    }

    pub fn load_script(&self) -> PathBuf {
        self.script_dir.join(LOAD_SCRIPT_FILE)
    }

    pub fn initial_variables(&self) -> PathBuf {
        self.script_dir.join(INITIAL_VARS_FILE)
    }

    pub fn variables_file(&self, seq: RequestSeq) -> PathBuf {
        self.var_dir.join(format!("vars{}.ocn", seq))
    }

    pub fn results_file(&self, seq: RequestSeq) -> PathBuf {
        self.result_dir.join(format!("out{}.txt", seq))
    }
}

/// Size argument passed to `updateAndRun`: how many variables were sent.
fn element_count(data: &Value) -> usize {
    match data {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        Value::String(s) => s.chars().count(),
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
    }
}

/// Check the request shape without interpreting `data`.
pub fn parse_request(value: &Value) -> Result<Request, TranslationError> {
    let object = value.as_object().ok_or(TranslationError::NotAnObject)?;
    let kind = object.get("type").ok_or(TranslationError::MissingField("type"))?;
    let data = object.get("data").ok_or(TranslationError::MissingField("data"))?;

    let kind = match kind.as_str() {
        Some(name) => name
            .parse::<RequestKind>()
            .map_err(|unknown| TranslationError::UnknownType(unknown.0))?,
        None => return Err(TranslationError::UnknownType(kind.to_string())),
    };

    Ok(Request {
        kind,
        data: data.clone(),
    })
}

pub struct Translator<S> {
    layout: FileLayout,
    store: S,
}

impl<S: VariableStore> Translator<S> {
    pub fn new(layout: FileLayout, store: S) -> Self {
        Self { layout, store }
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Map an optimizer request onto a simulator command.
    ///
    /// `updateAndRun` writes the variables file and truncates the results file
    /// for `seq` before the expression is returned.
    pub fn translate_request(&self, value: &Value, seq: RequestSeq) -> Result<Command, BridgeError> {
        let Request { kind, data } = parse_request(value)?;

        let command = match kind {
            RequestKind::Info => {
                let text = data.as_str().ok_or(TranslationError::InvalidData {
                    kind,
                    reason: "expected a string",
                })?;
                if text.eq_ignore_ascii_case(EXIT_KEYWORD) {
                    Command::Terminate
                } else {
                    Command::Notify {
                        expression: INFO_EXPRESSION.to_string(),
                    }
                }
            }
            RequestKind::LoadSimulator => Command::RoundTrip {
                kind,
                expression: format!("loadSimulator( \"{}\" )", self.layout.load_script().display()),
            },
            RequestKind::UpdateAndRun => {
                let vars_path = self.layout.variables_file(seq);
                self.store.store_variables(&data, &vars_path)?;

                let results_path = self.layout.results_file(seq);
                create_empty(&results_path)?;

                Command::RoundTrip {
                    kind,
                    expression: format!(
                        "updateAndRun( \"{}\" \"RESULT_FILE={}\" {})",
                        vars_path.display(),
                        results_path.display(),
                        element_count(&data)
                    ),
                }
            }
        };

        tracing::debug!(%kind, %seq, ?command, "Translated request");
        Ok(command)
    }

    /// Map the simulator's answer onto the reply for the request numbered `seq`.
    pub fn translate_response(&self, text: &str, seq: RequestSeq) -> Result<Reply, CollaboratorError> {
        if text.contains(LOAD_OK_MARKER) {
            let data = self.store.read_variables(&self.layout.initial_variables())?;
            Ok(Reply::new(ReplyKind::LoadSimulator, data))
        } else if text.contains(RUN_OK_MARKER) {
            let data = self.store.read_results(&self.layout.results_file(seq))?;
            Ok(Reply::new(ReplyKind::UpdateAndRun, data))
        } else {
            Ok(Reply::info(format!("{}{}", INFO_PREFIX, text)))
        }
    }
}

fn create_empty(path: &Path) -> Result<(), CollaboratorError> {
    std::fs::File::create(path)
        .map(drop)
        .map_err(|e| CollaboratorError::io(path, e))
}
