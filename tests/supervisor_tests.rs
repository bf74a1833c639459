use std::{sync::Arc, time::Duration};

use notification_dispatch::{
    api::{AppState, run_api_server},
    clients::health::HealthChecker,
    config::DecodeFailurePolicy,
    error::WorkerError,
    smart_send::SmartSender,
    supervisor::supervise,
    worker::{DispatchWorker, WorkerState},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::{DispatcherParts, FakeDirectory, InMemoryQueue, InMemoryStore, RecordingBot, service};

const GRACE: Duration = Duration::from_secs(5);

fn app_state(queue: Arc<InMemoryQueue>) -> Arc<AppState> {
    let service = service(queue, InMemoryStore::new());
    let smart_sender = Arc::new(SmartSender::new(
        service.clone(),
        Arc::new(FakeDirectory::new()),
        RecordingBot::new(),
        4,
    ));

    Arc::new(AppState {
        service,
        smart_sender,
        health_checker: HealthChecker::new(Vec::new()),
        admin_email: "ops@example.com".to_string(),
    })
}

fn spawn_worker(
    queue: &Arc<InMemoryQueue>,
    shutdown: &CancellationToken,
) -> (Arc<DispatchWorker>, JoinHandle<Result<(), WorkerError>>) {
    let parts = DispatcherParts::new();
    let worker = Arc::new(DispatchWorker::new(
        queue.clone(),
        parts.dispatcher(DecodeFailurePolicy::Requeue),
    ));

    let handle = {
        let worker = Arc::clone(&worker);
        let cancel = shutdown.child_token();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    (worker, handle)
}

#[tokio::test]
async fn test_server_bind_failure_stops_worker_and_fails_process() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let queue = InMemoryQueue::new();
    let shutdown = CancellationToken::new();
    let (worker, worker_task) = spawn_worker(&queue, &shutdown);
    let server_task = tokio::spawn(run_api_server(app_state(queue), port, shutdown.clone()));

    let result = supervise(
        worker_task,
        server_task,
        shutdown.clone(),
        GRACE,
        std::future::pending(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("HTTP server failed"));
    assert!(shutdown.is_cancelled());
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn test_worker_failure_stops_server_and_fails_process() {
    let queue = InMemoryQueue::new();
    let shutdown = CancellationToken::new();
    let (_, worker_task) = spawn_worker(&queue, &shutdown);
    let server_task = tokio::spawn(run_api_server(app_state(queue.clone()), 0, shutdown.clone()));

    queue.close();

    let result = supervise(
        worker_task,
        server_task,
        shutdown.clone(),
        GRACE,
        std::future::pending(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("Dispatch worker failed"));
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn test_signal_stops_both_tasks_cleanly() {
    let queue = InMemoryQueue::new();
    let shutdown = CancellationToken::new();
    let (worker, worker_task) = spawn_worker(&queue, &shutdown);
    let server_task = tokio::spawn(run_api_server(app_state(queue), 0, shutdown.clone()));

    let result = supervise(
        worker_task,
        server_task,
        shutdown.clone(),
        GRACE,
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await;

    assert!(result.is_ok());
    assert!(shutdown.is_cancelled());
    assert_eq!(worker.state(), WorkerState::Stopped);
}
