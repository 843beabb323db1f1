//! Host controller for a single execution worker.
//!
//! A [`WorkerHandle`] owns the host ends of one worker's channels. The
//! worker is single-slot: while an execution is in flight, a second one is
//! refused with [`ChannelError::Busy`] rather than left to undefined
//! behaviour. Run several handles for concurrent executions.

use std::sync::Arc;
use std::thread::JoinHandle;

use relay_core::{ChannelError, ExecutionPhase, ExecutionRequest, Interpreter, DEFAULT_MODE};
use relay_events::{EventReceiver, ExecutionStream, RequestSender};

use crate::config::WorkerConfig;
use crate::worker::{spawn_worker, SpawnedWorker, WorkerStatus};

/// Host side of one execution worker.
pub struct WorkerHandle {
    /// Host end of the request leg; dropping it stops the worker.
    requests: RequestSender,
    /// Host end of the event leg, shared by every execution in turn.
    events: EventReceiver,
    /// Phase and request count published by the worker thread.
    status: Arc<WorkerStatus>,
    /// Worker thread; yields the number of requests served.
    thread: JoinHandle<u64>,
}

impl WorkerHandle {
    /// Start a worker thread that runs `interpreter`.
    pub fn spawn<I: Interpreter>(interpreter: I, config: &WorkerConfig) -> Result<Self, ChannelError> {
        let SpawnedWorker {
            requests,
            events,
            status,
            thread,
        } = spawn_worker(interpreter, config)?;

        Ok(Self {
            requests,
            events,
            status,
            thread,
        })
    }

    /// Submit `request` and return the stream of its events.
    pub async fn execute(
        &mut self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionStream<'_>, ChannelError> {
        self.execute_with_mode(DEFAULT_MODE, request).await
    }

    /// Like [`execute`](Self::execute) with an explicit advisory `mode`.
    pub async fn execute_with_mode(
        &mut self,
        mode: &str,
        request: &ExecutionRequest,
    ) -> Result<ExecutionStream<'_>, ChannelError> {
        let raw = request.to_message(mode)?;
        self.submit_raw(raw).await
    }

    /// Submit a raw wire message as-is.
    ///
    /// Events left over from an abandoned stream are discarded first. If
    /// that execution has not sent `done` yet, fails with
    /// [`ChannelError::Busy`] and nothing is sent.
    pub async fn submit_raw(
        &mut self,
        raw: impl Into<String>,
    ) -> Result<ExecutionStream<'_>, ChannelError> {
        self.events.settle()?;
        self.requests.send(raw.into()).await?;
        Ok(self.events.begin())
    }

    /// Wait for an abandoned execution to finish.
    ///
    /// Returns how many of its events were discarded. There is no timeout:
    /// an interpreter call that never returns stalls this forever.
    pub async fn wait_idle(&mut self) -> Result<usize, ChannelError> {
        self.events.finish_pending().await
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.status.phase()
    }

    pub fn requests_served(&self) -> u64 {
        self.status.requests_served()
    }

    /// Close the request leg and join the worker thread.
    ///
    /// An execution still in flight runs to completion first. Returns the
    /// number of requests the worker served.
    pub async fn shutdown(self) -> Result<u64, ChannelError> {
        let Self {
            requests,
            events,
            thread,
            ..
        } = self;
        drop(requests);

        let joined = tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| ChannelError::Closed)?;
        drop(events);

        match joined {
            Ok(served) => {
                tracing::debug!(served, "Execution worker shut down");
                Ok(served)
            }
            Err(_) => {
                tracing::error!("Execution worker thread panicked");
                Err(ChannelError::Closed)
            }
        }
    }
}
