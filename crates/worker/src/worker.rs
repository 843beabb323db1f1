//! Execution worker: bridges inbound request messages to interpreter calls.
//!
//! A worker serves one request at a time on its own OS thread. For every
//! request it sends the interpreter's output as `append` events the moment
//! they are emitted, then exactly one `done`, whatever the outcome.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use relay_core::{
    AdapterExecutionError, ChannelError, ErrorKind, ExecutionPhase, ExecutionRequest,
    Interpreter, WorkerRequest,
};
use relay_events::{
    event_channel, request_channel, EventReceiver, EventSender, RequestReceiver, RequestSender,
};

use crate::config::WorkerConfig;

/// Phase and counters shared between a worker and whoever watches it.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    phase: AtomicU8,
    served: AtomicU64,
}

impl WorkerStatus {
    pub fn phase(&self) -> ExecutionPhase {
        ExecutionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Requests answered with `done` so far.
    pub fn requests_served(&self) -> u64 {
        self.served.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: ExecutionPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}

/// Drives an [`Interpreter`] on behalf of a host.
pub struct ExecutionWorker<I> {
    interpreter: I,
    events: EventSender,
    status: Arc<WorkerStatus>,
}

impl<I: Interpreter> ExecutionWorker<I> {
    pub fn new(interpreter: I, events: EventSender) -> Self {
        Self {
            interpreter,
            events,
            status: Arc::default(),
        }
    }

    pub fn status(&self) -> Arc<WorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Handle one raw request message.
    ///
    /// Malformed messages are answered with a `request_format` error and the
    /// interpreter is not called. Either way the last event sent is `done`.
    pub fn on_request(&self, raw: &str) {
        let seq = self.status.requests_served() + 1;
        let _span = tracing::info_span!("request", seq).entered();

        match WorkerRequest::parse(raw) {
            Ok(WorkerRequest::Execute { mode, request }) => self.execute(&mode, &request),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed request");
                self.events.error(ErrorKind::RequestFormat, e.to_string());
            }
        }

        // Phase first: a host that has seen `done` must also see `Completed`.
        self.status.set_phase(ExecutionPhase::Completed);
        self.status.served.fetch_add(1, Ordering::AcqRel);
        self.events.done();
    }

    fn execute(&self, mode: &str, request: &ExecutionRequest) {
        tracing::info!(
            mode,
            code_len = request.code.len(),
            inputs = request.inputs.len(),
            flags = ?request.flags,
            "Worker received request"
        );
        self.status.set_phase(ExecutionPhase::Running);

        let emitter = self.events.emitter();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.interpreter.execute(
                &request.code,
                &request.inputs,
                &request.flags,
                &emitter,
            )
        }))
        .unwrap_or_else(|payload| Err(AdapterExecutionError::Panicked(panic_message(&*payload))));

        match result {
            Ok(()) => {
                tracing::debug!(emitted = emitter.emitted(), "Execution finished");
            }
            Err(e) => {
                tracing::warn!(error = %e, emitted = emitter.emitted(), "Execution failed");
                self.events.error(ErrorKind::AdapterExecution, e.to_string());
            }
        }
    }

    /// Serve requests one at a time until the request leg closes.
    ///
    /// Returns the number of requests served. Blocks the calling thread.
    pub fn run(self, mut requests: RequestReceiver) -> u64 {
        tracing::debug!("Worker loop started");
        while let Some(raw) = requests.blocking_recv() {
            self.on_request(&raw);
        }
        let served = self.status.requests_served();
        tracing::debug!(served, "Worker loop stopped");
        served
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Host-side ends of a worker running on its own thread.
pub struct SpawnedWorker {
    pub requests: RequestSender,
    pub events: EventReceiver,
    pub status: Arc<WorkerStatus>,
    pub thread: JoinHandle<u64>,
}

/// Start a worker for `interpreter` on a dedicated, named OS thread.
pub fn spawn_worker<I: Interpreter>(
    interpreter: I,
    config: &WorkerConfig,
) -> Result<SpawnedWorker, ChannelError> {
    let (requests, request_rx) = request_channel(config.request_capacity);
    let (event_tx, events) = event_channel();

    let worker = ExecutionWorker::new(interpreter, event_tx);
    let status = worker.status();

    let thread = thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || worker.run(request_rx))
        .map_err(ChannelError::Spawn)?;

    tracing::debug!(thread = %config.thread_name, "Spawned execution worker");

    Ok(SpawnedWorker {
        requests,
        events,
        status,
        thread,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;

    use assert_matches::assert_matches;
    use relay_core::{ErrorReport, OutputSink, WorkerEvent};
    use serde_json::json;

    use super::*;

    fn drain(events: &mut EventReceiver) -> Vec<WorkerEvent> {
        let mut out = Vec::new();
        while let Ok(Some(event)) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn emit_inputs(
        _code: &str,
        inputs: &[String],
        _flags: &BTreeSet<String>,
        out: &dyn OutputSink,
    ) -> Result<(), AdapterExecutionError> {
        for input in inputs {
            out.emit(json!(input));
        }
        Ok(())
    }

    #[test]
    fn appends_precede_done() {
        let (tx, mut rx) = event_channel();
        let worker = ExecutionWorker::new(emit_inputs, tx);

        worker.on_request(r#"{"mode":"run","code":"","inputs":["a","b"],"flags":[]}"#);

        assert_eq!(
            drain(&mut rx),
            vec![WorkerEvent::append("a"), WorkerEvent::append("b"), WorkerEvent::Done]
        );
        assert_eq!(worker.status().phase(), ExecutionPhase::Completed);
        assert_eq!(worker.status().requests_served(), 1);
    }

    #[test]
    fn malformed_request_skips_interpreter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let interpreter = move |_: &str,
                                _: &[String],
                                _: &BTreeSet<String>,
                                _: &dyn OutputSink|
              -> Result<(), AdapterExecutionError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        let (tx, mut rx) = event_channel();
        let worker = ExecutionWorker::new(interpreter, tx);
        worker.on_request(r#"{"mode":"run","inputs":[],"flags":[]}"#);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_matches!(
            &events[0],
            WorkerEvent::Error(ErrorReport { kind: ErrorKind::RequestFormat, message })
                if message.contains("code")
        );
        assert_eq!(events[1], WorkerEvent::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_interpreter_still_completes() {
        let interpreter = |_: &str,
                           _: &[String],
                           _: &BTreeSet<String>,
                           out: &dyn OutputSink|
         -> Result<(), AdapterExecutionError> {
            out.emit(json!("before"));
            panic!("interpreter blew up");
        };

        let (tx, mut rx) = event_channel();
        let worker = ExecutionWorker::new(interpreter, tx);
        worker.on_request(r#"{"mode":"run","code":"x","inputs":[],"flags":[]}"#);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], WorkerEvent::append("before"));
        assert_matches!(
            &events[1],
            WorkerEvent::Error(ErrorReport { kind: ErrorKind::AdapterExecution, message })
                if message.contains("interpreter blew up")
        );
        assert_eq!(events[2], WorkerEvent::Done);
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "unknown panic payload");
    }

    #[test]
    fn run_serves_until_request_leg_closes() {
        let (requests, request_rx) = request_channel(4);
        let (tx, mut rx) = event_channel();
        let worker = ExecutionWorker::new(emit_inputs, tx);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        rt.block_on(async {
            for input in ["1", "2"] {
                let raw = ExecutionRequest::new("")
                    .with_inputs([input])
                    .to_message("run")
                    .unwrap();
                requests.send(raw).await.expect("send");
            }
        });
        drop(requests);

        assert_eq!(worker.run(request_rx), 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                WorkerEvent::append("1"),
                WorkerEvent::Done,
                WorkerEvent::append("2"),
                WorkerEvent::Done,
            ]
        );
    }
}
