use std::{future::Future, time::Duration};

use anyhow::{Result, anyhow};
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::WorkerError;

/// Runs until `signal` fires or either task exits on its own, then cancels
/// `shutdown` and gives the remaining task `grace` to drain.
///
/// An early exit of either task is treated as a failure of the process.
pub async fn supervise(
    mut worker: JoinHandle<Result<(), WorkerError>>,
    mut server: JoinHandle<Result<()>>,
    shutdown: CancellationToken,
    grace: Duration,
    signal: impl Future<Output = ()>,
) -> Result<()> {
    let mut worker_exit = None;
    let mut server_exit = None;

    tokio::select! {
        _ = signal => info!("Received shutdown signal"),
        exit = &mut worker => {
            warn!("Dispatch worker exited, shutting down");
            worker_exit = Some(exit);
        }
        exit = &mut server => {
            warn!("HTTP server exited, shutting down");
            server_exit = Some(exit);
        }
    }

    shutdown.cancel();

    let worker_exit = match worker_exit {
        Some(exit) => Some(exit),
        None => drain("dispatch worker", &mut worker, grace).await,
    };
    let server_exit = match server_exit {
        Some(exit) => Some(exit),
        None => drain("http server", &mut server, grace).await,
    };

    let worker_result = match worker_exit {
        Some(Ok(Ok(()))) | None => Ok(()),
        Some(Ok(Err(e))) => Err(anyhow!("Dispatch worker failed: {}", e)),
        Some(Err(e)) => Err(anyhow!("Dispatch worker panicked: {}", e)),
    };
    let server_result = match server_exit {
        Some(Ok(Ok(()))) | None => Ok(()),
        Some(Ok(Err(e))) => Err(anyhow!("HTTP server failed: {}", e)),
        Some(Err(e)) => Err(anyhow!("HTTP server panicked: {}", e)),
    };

    if let (Err(_), Err(server_err)) = (&worker_result, &server_result) {
        error!(error = %server_err, "HTTP server failed");
    }

    worker_result.and(server_result)
}

async fn drain<T>(
    name: &'static str,
    handle: &mut JoinHandle<T>,
    grace: Duration,
) -> Option<Result<T, tokio::task::JoinError>> {
    match timeout(grace, &mut *handle).await {
        Ok(exit) => Some(exit),
        Err(_) => {
            warn!(task = name, "Shutdown timeout exceeded, aborting");
            handle.abort();
            None
        }
    }
}
