//! The two legs of the host ⇄ worker message pipe.
//!
//! - Request leg: bounded [`mpsc`] channel of raw JSON text. The host sends
//!   asynchronously; the worker thread blocks on [`RequestReceiver::blocking_recv`].
//! - Event leg: unbounded [`mpsc`] channel of [`WorkerEvent`]s. The worker
//!   sends synchronously from its own thread; the host awaits them.
//!
//! Both legs are FIFO. Nothing is dropped or duplicated while both ends live.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relay_core::{ChannelError, ErrorKind, ErrorReport, OutputSink, WorkerEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::stream::ExecutionStream;

/// Default number of requests that may queue on the request leg.
pub const DEFAULT_REQUEST_CAPACITY: usize = 16;

/// Create the host → worker request leg. `capacity` is clamped to at least 1.
pub fn request_channel(capacity: usize) -> (RequestSender, RequestReceiver) {
    let (inner_tx, inner_rx) = mpsc::channel(capacity.max(1));
    (
        RequestSender { inner: inner_tx },
        RequestReceiver { inner: inner_rx },
    )
}

/// Create the worker → host event leg.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (inner_tx, inner_rx) = mpsc::unbounded_channel();
    (
        EventSender { inner: inner_tx },
        EventReceiver {
            inner: inner_rx,
            awaiting_done: false,
        },
    )
}

// ---------------------------------------------------------------------------
// Request leg
// ---------------------------------------------------------------------------

/// Host end of the request leg.
#[derive(Debug, Clone)]
pub struct RequestSender {
    inner: mpsc::Sender<String>,
}

impl RequestSender {
    /// Queue one raw request message for the worker.
    pub async fn send(&self, raw: String) -> Result<(), ChannelError> {
        self.inner.send(raw).await.map_err(|_| ChannelError::Closed)
    }
}

/// Worker end of the request leg.
#[derive(Debug)]
pub struct RequestReceiver {
    inner: mpsc::Receiver<String>,
}

impl RequestReceiver {
    /// Block the calling thread until the next request arrives.
    ///
    /// Returns `None` once every [`RequestSender`] is gone. Must not be called
    /// from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<String> {
        self.inner.blocking_recv()
    }
}

// ---------------------------------------------------------------------------
// Event leg
// ---------------------------------------------------------------------------

/// Worker end of the event leg.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<WorkerEvent>,
}

impl EventSender {
    /// Send one event. Returns `false` if the host has gone away.
    pub fn send(&self, event: WorkerEvent) -> bool {
        match self.inner.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(?event, "Host receiver dropped, discarding worker event");
                false
            }
        }
    }

    pub fn append(&self, val: Value) -> bool {
        self.send(WorkerEvent::Append { val })
    }

    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) -> bool {
        self.send(WorkerEvent::Error(ErrorReport::new(kind, message)))
    }

    pub fn done(&self) -> bool {
        self.send(WorkerEvent::Done)
    }

    /// Build the emit capability handed to an interpreter.
    pub fn emitter(&self) -> Emitter {
        Emitter {
            events: self.clone(),
            emitted: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Emit handle bound to a worker's event leg.
///
/// Each [`OutputSink::emit`] call sends one `append` event immediately; the
/// interpreter never sees the channel itself.
#[derive(Debug, Clone)]
pub struct Emitter {
    events: EventSender,
    emitted: Arc<AtomicUsize>,
}

impl Emitter {
    /// Number of values emitted through this handle (and its clones).
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl OutputSink for Emitter {
    fn emit(&self, value: Value) {
        let seq = self.emitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(seq, "append");
        self.events.append(value);
    }
}

/// Host end of the event leg.
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::UnboundedReceiver<WorkerEvent>,
    awaiting_done: bool,
}

impl EventReceiver {
    /// Receive the next event, whichever request it belongs to.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        let event = self.inner.recv().await;
        self.observe(event.as_ref());
        event
    }

    /// Non-blocking receive. `Ok(None)` means nothing is queued yet.
    pub fn try_recv(&mut self) -> Result<Option<WorkerEvent>, ChannelError> {
        match self.inner.try_recv() {
            Ok(event) => {
                self.observe(Some(&event));
                Ok(Some(event))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    /// Whether a request was started whose `done` has not been received.
    pub fn is_awaiting_done(&self) -> bool {
        self.awaiting_done
    }

    /// Discard what is left of an abandoned execution's events.
    ///
    /// Returns the number of events discarded. Fails with
    /// [`ChannelError::Busy`] if that execution has not sent `done` yet.
    pub fn settle(&mut self) -> Result<usize, ChannelError> {
        let mut discarded = 0;
        while self.awaiting_done {
            match self.try_recv()? {
                Some(_) => discarded += 1,
                None => return Err(ChannelError::Busy),
            }
        }
        if discarded > 0 {
            tracing::debug!(discarded, "Discarded events of an abandoned execution");
        }
        Ok(discarded)
    }

    /// Wait until an abandoned execution sends `done`, discarding its events.
    pub async fn finish_pending(&mut self) -> Result<usize, ChannelError> {
        let mut discarded = 0;
        while self.awaiting_done {
            match self.recv().await {
                Some(_) => discarded += 1,
                None => return Err(ChannelError::Closed),
            }
        }
        Ok(discarded)
    }

    /// Start reading the events of a request that was just sent.
    pub fn begin(&mut self) -> ExecutionStream<'_> {
        self.awaiting_done = true;
        ExecutionStream::new(self)
    }

    fn observe(&mut self, event: Option<&WorkerEvent>) {
        match event {
            Some(WorkerEvent::Done) | None => self.awaiting_done = false,
            Some(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
