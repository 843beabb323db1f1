//! Interpreter adapter boundary.
//!
//! The interpreter itself is an external collaborator. The worker only
//! depends on the call contract expressed by [`Interpreter`]: a synchronous
//! call that may emit any number of output values through an
//! [`OutputSink`] before returning or failing.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::AdapterExecutionError;

/// Capability handed to an interpreter for reporting output.
///
/// Each call delivers exactly one unit of output, immediately.
pub trait OutputSink {
    fn emit(&self, value: Value);
}

/// Trait implemented by every interpreter the worker can drive.
///
/// Implementations run on the worker thread and may block for as long as
/// the submitted code runs.
pub trait Interpreter: Send + 'static {
    fn execute(
        &self,
        code: &str,
        inputs: &[String],
        flags: &BTreeSet<String>,
        out: &dyn OutputSink,
    ) -> Result<(), AdapterExecutionError>;
}

impl<F> Interpreter for F
where
    F: Fn(&str, &[String], &BTreeSet<String>, &dyn OutputSink) -> Result<(), AdapterExecutionError>
        + Send
        + 'static,
{
    fn execute(
        &self,
        code: &str,
        inputs: &[String],
        flags: &BTreeSet<String>,
        out: &dyn OutputSink,
    ) -> Result<(), AdapterExecutionError> {
        self(code, inputs, flags, out)
    }
}

/// In-memory sink that records emitted values in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    values: std::sync::Mutex<Vec<Value>>,
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_values(self) -> Vec<Value> {
        self.values
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl OutputSink for MemorySink {
    fn emit(&self, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(value);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
