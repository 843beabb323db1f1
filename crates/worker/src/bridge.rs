//! Line-delimited JSON bridge between a byte stream and one worker.
//!
//! Requests are read one per line and queued on the worker's request leg in
//! arrival order; blank lines are skipped. Every worker event is written back
//! as one JSON line and flushed immediately. The bridge stops once the input
//! reaches EOF and the worker has answered everything queued before it.

use relay_events::RequestSender;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::worker::SpawnedWorker;

/// Serve `reader` with `worker`, writing events to `writer`.
///
/// Returns the number of requests the worker served.
pub async fn serve<R, W>(reader: R, mut writer: W, worker: SpawnedWorker) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let SpawnedWorker {
        requests,
        mut events,
        thread,
        ..
    } = worker;

    let forward = tokio::spawn(forward_requests(reader, requests));

    while let Some(event) = events.recv().await {
        let mut line = event.to_line()?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }

    forward.await??;

    let served = tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    Ok(served)
}

/// Forward non-blank lines to the worker until EOF.
async fn forward_requests<R>(reader: R, requests: RequestSender) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if requests.send(line).await.is_err() {
            tracing::warn!("Worker stopped accepting requests");
            break;
        }
    }
    tracing::debug!("Request input closed");
    Ok(())
}
