//! Message pipe between a host and an execution worker.
//!
//! - [`channel`] -- the request leg, the event leg and the [`Emitter`]
//!   capability handed to interpreters.
//! - [`stream`] -- [`ExecutionStream`], the host's view of one request's
//!   events, and the collected [`Transcript`].

pub mod channel;
pub mod stream;

pub use channel::{
    event_channel, request_channel, Emitter, EventReceiver, EventSender, RequestReceiver,
    RequestSender, DEFAULT_REQUEST_CAPACITY,
};
pub use stream::{ExecutionStream, Transcript};
