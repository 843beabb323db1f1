//! Error taxonomy shared by the worker and its host.
//!
//! - [`RequestFormatError`] is detected by the worker before the adapter runs.
//! - [`AdapterExecutionError`] wraps whatever the interpreter reports.
//! - [`ChannelError`] is transport-level and only ever seen by the host.
//!
//! The first two travel over the wire as an `error` event classified by
//! [`ErrorKind`]; neither one suppresses the terminal `done` event.

use serde::{Deserialize, Serialize};

/// A request message that could not be turned into an execution.
#[derive(Debug, thiserror::Error)]
pub enum RequestFormatError {
    /// The message text is not JSON at all.
    #[error("request is not valid JSON: {0}")]
    InvalidJson(String),

    /// Valid JSON, but not an object.
    #[error("request must be a JSON object")]
    NotAnObject,

    /// One of `mode`, `code`, `inputs` or `flags` is absent.
    #[error("request is missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present with the wrong JSON type.
    #[error("request field `{field}` must be {expected}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// Human description of the accepted shape.
        expected: &'static str,
    },
}

/// Failure reported by (or caught around) an interpreter call.
#[derive(Debug, thiserror::Error)]
pub enum AdapterExecutionError {
    /// The interpreter reported a failure in the submitted code.
    #[error("interpreter raised an error: {0}")]
    Raised(String),

    /// The interpreter call panicked; the payload message is kept.
    #[error("interpreter panicked: {0}")]
    Panicked(String),

    /// The interpreter process could not be started.
    #[error("failed to start interpreter: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading from or writing to a running interpreter failed.
    #[error("I/O error while talking to interpreter: {0}")]
    Io(#[from] std::io::Error),

    /// The interpreter process exited unsuccessfully.
    #[error("interpreter exited with code {code}{}", stderr_suffix(.stderr))]
    ExitStatus {
        /// Exit code, or `-1` when the process was killed by a signal.
        code: i32,
        /// Captured stderr, trailing whitespace removed.
        stderr: String,
    },
}

impl AdapterExecutionError {
    /// Convenience constructor for adapters that report plain messages.
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised(message.into())
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Transport-level failure between host and worker.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The worker thread is gone.
    #[error("worker channel closed before the execution completed")]
    Closed,

    /// A previous execution has not sent `done` yet.
    #[error("worker is still running a previous execution")]
    Busy,

    /// The request could not be serialized for the wire.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The OS refused to start the worker thread.
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Wire classification of an `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`RequestFormatError`].
    RequestFormat,
    /// See [`AdapterExecutionError`].
    AdapterExecution,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestFormat => "request_format",
            Self::AdapterExecution => "adapter_execution",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_missing_field() {
        let err = RequestFormatError::MissingField("code");
        assert_eq!(err.to_string(), "request is missing field `code`");
    }

    #[test]
    fn display_invalid_field() {
        let err = RequestFormatError::InvalidField {
            field: "inputs",
            expected: "an array of strings",
        };
        assert_eq!(
            err.to_string(),
            "request field `inputs` must be an array of strings"
        );
    }

    #[test]
    fn display_exit_status() {
        let err = AdapterExecutionError::ExitStatus {
            code: 2,
            stderr: "SyntaxError".to_string(),
        };
        assert_eq!(err.to_string(), "interpreter exited with code 2: SyntaxError");
    }

    #[test]
    fn display_exit_status_without_stderr() {
        let err = AdapterExecutionError::ExitStatus {
            code: 2,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "interpreter exited with code 2");
    }

    #[test]
    fn spawn_error_has_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "no such program");
        let err = AdapterExecutionError::Spawn(inner);
        assert!(
            std::error::Error::source(&err).is_some(),
            "Spawn variant should expose the io error as its source"
        );
    }

    #[test]
    fn raised_has_no_source() {
        let err = AdapterExecutionError::raised("division by zero");
        assert!(std::error::Error::source(&err).is_none());
        assert!(err.to_string().ends_with("division by zero"));
    }

    #[test]
    fn error_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(ErrorKind::RequestFormat).unwrap(),
            "request_format"
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::AdapterExecution).unwrap(),
            "adapter_execution"
        );
        assert_eq!(ErrorKind::AdapterExecution.to_string(), "adapter_execution");
    }
}
