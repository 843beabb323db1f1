//! Execution worker and host controller.
//!
//! - [`worker`] -- [`ExecutionWorker`], the single-slot dispatch loop that
//!   runs on a dedicated thread.
//! - [`handle`] -- [`WorkerHandle`], the host side of one worker.
//! - [`bridge`] -- [`serve`], the NDJSON request/event loop behind the
//!   `relay-worker` binary.
//! - [`config`] -- [`WorkerConfig`], read from `RELAY_*` environment variables.

pub mod bridge;
pub mod config;
pub mod handle;
pub mod worker;

pub use bridge::serve;
pub use config::WorkerConfig;
pub use handle::WorkerHandle;
pub use worker::{spawn_worker, ExecutionWorker, SpawnedWorker, WorkerStatus};
