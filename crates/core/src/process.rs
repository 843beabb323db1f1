//! Interpreter adapter backed by an external interpreter process.
//!
//! The submitted code is passed as the final command-line argument
//! (`python3 -u -c <code>`, `sh -c <code>`), inputs are piped to stdin one
//! per line, and every stdout line is emitted as soon as it is read.

use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;

use serde_json::Value;

use crate::adapter::{Interpreter, OutputSink};
use crate::error::AdapterExecutionError;

/// Environment variable through which request flags reach the child.
pub const FLAGS_ENV_VAR: &str = "RELAY_FLAGS";

/// Maximum stderr size captured per execution (10 MiB).
const MAX_STDERR_BYTES: u64 = 10 * 1024 * 1024;

/// Runs code through an interpreter program such as `python3` or `sh`.
///
/// Each input becomes exactly one stdin line, so inputs containing a line
/// break are rejected with [`AdapterExecutionError::Raised`] before the
/// process is started.
#[derive(Debug, Clone)]
pub struct ProcessInterpreter {
    /// Program looked up on `PATH` (or an absolute path).
    program: String,
    /// Arguments placed between the program and the submitted code.
    args: Vec<String>,
    /// Working directory of the child; inherited when `None`.
    working_directory: Option<PathBuf>,
    /// Extra environment variables for the child.
    env_vars: Vec<(String, String)>,
}

impl ProcessInterpreter {
    /// `args` are placed between the program and the submitted code.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_directory: None,
            env_vars: Vec::new(),
        }
    }

    /// Unbuffered `python3 -u -c <code>`.
    pub fn python() -> Self {
        Self::new("python3", ["-u", "-c"])
    }

    /// POSIX `sh -c <code>`.
    pub fn shell() -> Self {
        Self::new("sh", ["-c"])
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, code: &str, flags: &BTreeSet<String>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(code)
            .env(FLAGS_ENV_VAR, flags.iter().cloned().collect::<Vec<_>>().join(" "))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Interpreter for ProcessInterpreter {
    fn execute(
        &self,
        code: &str,
        inputs: &[String],
        flags: &BTreeSet<String>,
        out: &dyn OutputSink,
    ) -> Result<(), AdapterExecutionError> {
        if let Some(index) = inputs.iter().position(|input| input.contains('\n')) {
            return Err(AdapterExecutionError::raised(format!(
                "input {index} contains a line break; inputs are passed one per stdin line"
            )));
        }

        tracing::debug!(program = %self.program, inputs = inputs.len(), "Spawning interpreter");
        let mut child = self
            .command(code, flags)
            .spawn()
            .map_err(AdapterExecutionError::Spawn)?;

        // Feed stdin from its own thread so a child that prints before it
        // reads cannot deadlock against us.
        let stdin = child.stdin.take();
        let payload: String = inputs.iter().map(|input| format!("{input}\n")).collect();
        let stdin_task = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // The child may exit without reading; a broken pipe is fine.
                let _ = stdin.write_all(payload.as_bytes());
            }
        });

        let stderr = child.stderr.take();
        let stderr_task = thread::spawn(move || read_capped(stderr));

        if let Err(e) = forward_lines(&mut child, out) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AdapterExecutionError::Io(e));
        }

        let status = child.wait()?;
        let _ = stdin_task.join();
        let stderr_bytes = stderr_task.join().unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(AdapterExecutionError::ExitStatus {
                code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr_bytes).trim_end().to_string(),
            })
        }
    }
}

/// Emit each stdout line as a string value the moment it is complete.
fn forward_lines(child: &mut Child, out: &dyn OutputSink) -> std::io::Result<()> {
    let Some(stdout) = child.stdout.take() else {
        return Ok(());
    };
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        out.emit(Value::String(String::from_utf8_lossy(&buf).into_owned()));
    }
}

fn read_capped<R: Read>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_STDERR_BYTES).read_to_end(&mut buf);
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
