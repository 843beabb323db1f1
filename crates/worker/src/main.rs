//! `relay-worker` -- runs interpreted code off the host process.
//!
//! Reads one JSON request per line on stdin, runs it through the configured
//! interpreter program, and writes every worker event as one JSON line on
//! stdout as soon as it is produced. Logs go to stderr. See
//! [`relay_worker::config`] for the environment variables.

use relay_worker::{serve, spawn_worker, WorkerConfig};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env();
    let interpreter = config.process_interpreter();
    tracing::info!(
        interpreter = %config.interpreter,
        args = ?config.interpreter_args,
        thread = %config.thread_name,
        "Worker starting"
    );

    let worker = spawn_worker(interpreter, &config)?;
    let served = serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), worker).await?;
    tracing::info!(served, "Worker stopped");

    Ok(())
}
