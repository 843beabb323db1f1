//! Shared building blocks for running interpreted code off the host thread.
//!
//! - [`protocol`] -- request/event envelopes and request validation.
//! - [`error`] -- the error taxonomy (`thiserror`).
//! - [`adapter`] -- the synchronous interpreter call contract.
//! - [`process`] -- an adapter that drives an external interpreter process.

pub mod adapter;
pub mod error;
pub mod process;
pub mod protocol;

pub use adapter::{Interpreter, OutputSink};
pub use error::{AdapterExecutionError, ChannelError, ErrorKind, RequestFormatError};
pub use process::ProcessInterpreter;
pub use protocol::{
    ErrorReport, ExecutionPhase, ExecutionRequest, WorkerEvent, WorkerRequest, DEFAULT_MODE,
};
