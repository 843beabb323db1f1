//! Worker configuration loaded from environment variables.
//!
//! | Variable                 | Default        | Description                                  |
//! |--------------------------|----------------|----------------------------------------------|
//! | `RELAY_INTERPRETER`      | `python3`      | Interpreter program run for each request     |
//! | `RELAY_INTERPRETER_ARGS` | `-u -c`        | Arguments placed before the submitted code   |
//! | `RELAY_WORKING_DIR`      | --             | Working directory for the interpreter        |
//! | `RELAY_WORKER_THREAD`    | `relay-worker` | Name of the worker's OS thread               |
//! | `RELAY_REQUEST_BUFFER`   | `16`           | Requests that may queue before senders wait  |

use std::path::PathBuf;

use relay_core::ProcessInterpreter;
use relay_events::DEFAULT_REQUEST_CAPACITY;

pub const ENV_INTERPRETER: &str = "RELAY_INTERPRETER";
pub const ENV_INTERPRETER_ARGS: &str = "RELAY_INTERPRETER_ARGS";
pub const ENV_WORKING_DIR: &str = "RELAY_WORKING_DIR";
pub const ENV_WORKER_THREAD: &str = "RELAY_WORKER_THREAD";
pub const ENV_REQUEST_BUFFER: &str = "RELAY_REQUEST_BUFFER";

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_INTERPRETER_ARGS: &[&str] = &["-u", "-c"];
const DEFAULT_THREAD_NAME: &str = "relay-worker";

/// Settings for one execution worker and its subprocess interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Interpreter program run for each request.
    pub interpreter: String,
    /// Arguments placed before the submitted code.
    pub interpreter_args: Vec<String>,
    /// Working directory of the interpreter process.
    pub working_dir: Option<PathBuf>,
    /// Name given to the worker's OS thread.
    pub thread_name: String,
    /// Requests that may queue on the request leg before senders wait.
    pub request_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            interpreter_args: DEFAULT_INTERPRETER_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            working_dir: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            request_capacity: DEFAULT_REQUEST_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let request_capacity = match non_empty(ENV_REQUEST_BUFFER) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(
                        value = %raw,
                        default = defaults.request_capacity,
                        "RELAY_REQUEST_BUFFER must be a positive integer, using default"
                    );
                    defaults.request_capacity
                }
            },
            None => defaults.request_capacity,
        };

        Self {
            interpreter: non_empty(ENV_INTERPRETER)
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.interpreter),
            interpreter_args: lookup(ENV_INTERPRETER_ARGS)
                .map(|v| v.split_whitespace().map(str::to_owned).collect())
                .unwrap_or(defaults.interpreter_args),
            working_dir: non_empty(ENV_WORKING_DIR).map(PathBuf::from),
            thread_name: non_empty(ENV_WORKER_THREAD).unwrap_or(defaults.thread_name),
            request_capacity,
        }
    }

    /// The subprocess-backed interpreter described by this configuration.
    pub fn process_interpreter(&self) -> ProcessInterpreter {
        let interpreter =
            ProcessInterpreter::new(self.interpreter.clone(), self.interpreter_args.clone());
        match &self.working_dir {
            Some(dir) => interpreter.with_working_directory(dir.clone()),
            None => interpreter,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(config_from(&[]), WorkerConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            (ENV_INTERPRETER, "sh"),
            (ENV_INTERPRETER_ARGS, "-c"),
            (ENV_WORKING_DIR, "/tmp"),
            (ENV_WORKER_THREAD, "calc-worker"),
            (ENV_REQUEST_BUFFER, "4"),
        ]);
        assert_eq!(config.interpreter, "sh");
        assert_eq!(config.interpreter_args, vec!["-c"]);
        assert_eq!(config.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(config.thread_name, "calc-worker");
        assert_eq!(config.request_capacity, 4);
    }

    #[test]
    fn empty_args_override_means_no_args() {
        let config = config_from(&[(ENV_INTERPRETER, "node"), (ENV_INTERPRETER_ARGS, "")]);
        assert_eq!(config.interpreter, "node");
        assert!(config.interpreter_args.is_empty());
    }

    #[test]
    fn invalid_buffer_falls_back_to_default() {
        for raw in ["zero", "0", "-3"] {
            let config = config_from(&[(ENV_REQUEST_BUFFER, raw)]);
            assert_eq!(config.request_capacity, DEFAULT_REQUEST_CAPACITY, "value {raw}");
        }
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = config_from(&[(ENV_INTERPRETER, "  "), (ENV_WORKING_DIR, "")]);
        assert_eq!(config.interpreter, DEFAULT_INTERPRETER);
        assert!(config.working_dir.is_none());
    }

    #[test]
    fn process_interpreter_uses_configured_program() {
        let config = config_from(&[(ENV_INTERPRETER, "sh"), (ENV_INTERPRETER_ARGS, "-c")]);
        assert_eq!(config.process_interpreter().program(), "sh");
    }
}
