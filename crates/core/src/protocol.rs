//! Message envelopes exchanged between a host and an execution worker.
//!
//! Host → worker: one JSON request object per execution
//! (`{"mode", "code", "inputs", "flags"}`).
//!
//! Worker → host: a sequence of [`WorkerEvent`]s tagged by `command`:
//! zero or more `append`, optional `error` reports, then exactly one `done`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, RequestFormatError};

/// Mode sent by hosts that have nothing more specific to say.
pub const DEFAULT_MODE: &str = "execute";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Source code plus everything the interpreter needs to run it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub inputs: Vec<String>,
    pub flags: BTreeSet<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Encode as the wire request object.
    pub fn to_message(&self, mode: &str) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            mode: &'a str,
            #[serde(flatten)]
            request: &'a ExecutionRequest,
        }

        serde_json::to_string(&Envelope {
            mode,
            request: self,
        })
    }
}

/// Closed set of things a worker can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Run `request` through the interpreter. `mode` is only logged.
    Execute {
        mode: String,
        request: ExecutionRequest,
    },
}

impl WorkerRequest {
    /// Parse and validate a raw wire message.
    pub fn parse(raw: &str) -> Result<Self, RequestFormatError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RequestFormatError::InvalidJson(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, RequestFormatError> {
        let obj = value.as_object().ok_or(RequestFormatError::NotAnObject)?;

        let mode = required_string(obj, "mode")?;
        let code = required_string(obj, "code")?;
        let inputs = required_string_array(obj, "inputs")?;
        let flags = required_flags(obj, "flags")?;

        Ok(Self::Execute {
            mode,
            request: ExecutionRequest {
                code,
                inputs,
                flags,
            },
        })
    }
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, RequestFormatError> {
    obj.get(field).ok_or(RequestFormatError::MissingField(field))
}

fn required_string(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<String, RequestFormatError> {
    required(obj, field)?
        .as_str()
        .map(str::to_owned)
        .ok_or(RequestFormatError::InvalidField {
            field,
            expected: "a string",
        })
}

fn required_string_array(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, RequestFormatError> {
    let invalid = RequestFormatError::InvalidField {
        field,
        expected: "an array of strings",
    };
    let Some(items) = required(obj, field)?.as_array() else {
        return Err(invalid);
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_owned))
        .collect::<Option<Vec<_>>>()
        .ok_or(invalid)
}

/// Flags arrive either as an array of tokens or, from older front ends, as a
/// single string of one-character switches (`"jH"`).
fn required_flags(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<BTreeSet<String>, RequestFormatError> {
    match required(obj, field)? {
        Value::String(switches) => Ok(switches
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect()),
        Value::Array(_) => Ok(required_string_array(obj, field)
            .map_err(|_| RequestFormatError::InvalidField {
                field,
                expected: "an array of strings or a string of switches",
            })?
            .into_iter()
            .collect()),
        _ => Err(RequestFormatError::InvalidField {
            field,
            expected: "an array of strings or a string of switches",
        }),
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Error report carried by an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A message sent from the worker back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum WorkerEvent {
    /// One unit of incremental output.
    Append { val: Value },
    /// A failure report. Never terminal; `Done` still follows.
    Error(ErrorReport),
    /// End of one execution's event stream.
    Done,
}

impl WorkerEvent {
    pub fn append(val: impl Into<Value>) -> Self {
        Self::Append { val: val.into() }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Encode as a single NDJSON line (without the trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode one NDJSON line written by [`to_line`](Self::to_line).
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a worker is in the life of its current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    /// No request has been served yet.
    Idle,
    /// The interpreter call is in flight.
    Running,
    /// `done` has been sent for the last request.
    Completed,
}

impl ExecutionPhase {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Completed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Idle,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
