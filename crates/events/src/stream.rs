//! Host-side view of a single execution's event sequence.

use futures::Stream;
use relay_core::{ChannelError, ErrorReport, WorkerEvent};
use serde_json::Value;

use crate::channel::EventReceiver;

/// Events of one request, ending with (and including) its `done`.
///
/// Holds the host's [`EventReceiver`] mutably, so no other request can be
/// read through the same receiver until this stream is finished or dropped.
#[derive(Debug)]
pub struct ExecutionStream<'a> {
    events: &'a mut EventReceiver,
    finished: bool,
}

impl<'a> ExecutionStream<'a> {
    pub(crate) fn new(events: &'a mut EventReceiver) -> Self {
        Self {
            events,
            finished: false,
        }
    }

    /// Next event of this execution, or `None` once `done` was returned.
    ///
    /// Fails with [`ChannelError::Closed`] if the worker went away before
    /// sending `done`.
    pub async fn next_event(&mut self) -> Result<Option<WorkerEvent>, ChannelError> {
        if self.finished {
            return Ok(None);
        }
        match self.events.recv().await {
            Some(event) => {
                self.finished = event.is_done();
                Ok(Some(event))
            }
            None => {
                self.finished = true;
                Err(ChannelError::Closed)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for `done`, gathering everything that arrived before it.
    pub async fn collect(mut self) -> Result<Transcript, ChannelError> {
        let mut transcript = Transcript::default();
        while let Some(event) = self.next_event().await? {
            match event {
                WorkerEvent::Append { val } => transcript.output.push(val),
                WorkerEvent::Error(report) => transcript.errors.push(report),
                WorkerEvent::Done => {}
            }
        }
        Ok(transcript)
    }

    /// Adapt into a [`Stream`] that ends after `done` (or after a channel error).
    pub fn into_stream(self) -> impl Stream<Item = Result<WorkerEvent, ChannelError>> + 'a {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next_event().await {
                Ok(Some(event)) => Some((Ok(event), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

/// Everything one execution produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Appended values in emission order.
    pub output: Vec<Value>,
    /// Error reports in the order they were sent.
    pub errors: Vec<ErrorReport>,
}

impl Transcript {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use relay_core::ErrorKind;
    use serde_json::json;

    use crate::channel::event_channel;

    use super::*;

    #[tokio::test]
    async fn stream_stops_after_done() {
        let (tx, mut rx) = event_channel();
        tx.append(json!("3"));
        tx.done();
        tx.append(json!("belongs to the next request"));

        let mut stream = rx.begin();
        assert_eq!(stream.next_event().await.unwrap(), Some(WorkerEvent::append("3")));
        assert_eq!(stream.next_event().await.unwrap(), Some(WorkerEvent::Done));
        assert!(stream.is_finished());
        assert_eq!(stream.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn collect_separates_output_and_errors() {
        let (tx, mut rx) = event_channel();
        tx.append(json!("x"));
        tx.error(ErrorKind::AdapterExecution, "raised");
        tx.done();

        let transcript = rx.begin().collect().await.expect("collect");
        assert_eq!(transcript.output, vec![json!("x")]);
        assert_eq!(transcript.errors.len(), 1);
        assert_eq!(transcript.errors[0].kind, ErrorKind::AdapterExecution);
        assert!(!transcript.is_success());
    }

    #[tokio::test]
    async fn closed_before_done_is_an_error() {
        let (tx, mut rx) = event_channel();
        tx.append(json!(1));
        drop(tx);

        assert_matches!(rx.begin().collect().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn into_stream_yields_through_done() {
        let (tx, mut rx) = event_channel();
        tx.append(json!(1));
        tx.append(json!(2));
        tx.done();

        let events: Vec<_> = rx.begin().into_stream().collect().await;
        let events: Vec<_> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![WorkerEvent::append(1), WorkerEvent::append(2), WorkerEvent::Done]
        );
    }
}
