use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    clients::{AuditSink, IdempotencyStore, Mailer},
    config::DecodeFailurePolicy,
    error::{HandlerError, TransportError, WorkerError},
    models::{
        audit::CreateAuditLog,
        status::{DeliveryStatus, IdempotencyStatus},
        task::{EmailTask, Task},
    },
    queue::{MessageHandler, Queue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Executes decoded tasks. Every side effect here may run more than once.
pub struct TaskDispatcher {
    mailer: Arc<dyn Mailer>,
    idempotency: Arc<dyn IdempotencyStore>,
    audit: Arc<dyn AuditSink>,
    decode_policy: DecodeFailurePolicy,
}

impl TaskDispatcher {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        idempotency: Arc<dyn IdempotencyStore>,
        audit: Arc<dyn AuditSink>,
        decode_policy: DecodeFailurePolicy,
    ) -> Self {
        Self {
            mailer,
            idempotency,
            audit,
            decode_policy,
        }
    }

    pub async fn dispatch(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let task = match Task::decode(payload) {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, policy = ?self.decode_policy, "Failed to decode task");
                return Err(match self.decode_policy {
                    DecodeFailurePolicy::Requeue => HandlerError::Decode(e.to_string()),
                    DecodeFailurePolicy::DeadLetter => HandlerError::Poison(e.to_string()),
                });
            }
        };

        info!(kind = task.kind(), "Processing task");

        match &task {
            Task::Email(email) => self.deliver_email(email).await,
            Task::Notification { .. }
            | Task::DeleteNotification { .. }
            | Task::ReadNotification { .. } => self
                .audit
                .record(CreateAuditLog::for_lifecycle(&task))
                .await
                .map_err(|e| HandlerError::Delivery(e.to_string())),
        }
    }

    async fn deliver_email(&self, task: &EmailTask) -> Result<(), HandlerError> {
        let key = task.idempotency_key.as_deref();

        if let Some(key) = key {
            match self.idempotency.status(key).await {
                Ok(IdempotencyStatus::Sent) => {
                    info!(idempotency_key = key, "Email already sent, skipping");
                    return Ok(());
                }
                Ok(IdempotencyStatus::Processing) => {
                    warn!(idempotency_key = key, "Previous attempt did not finish, resending");
                }
                Ok(_) => {}
                Err(e) => warn!(idempotency_key = key, error = %e, "Idempotency lookup failed"),
            }

            if let Err(e) = self.idempotency.mark_processing(key).await {
                warn!(idempotency_key = key, error = %e, "Failed to mark email as processing");
            }
        }

        let outcome = self.mailer.send(&task.email, &task.subject, &task.body).await;

        let (status, error) = match &outcome {
            Ok(()) => (DeliveryStatus::Sent, None),
            Err(e) => (DeliveryStatus::Failed, Some(e.to_string())),
        };

        if let Some(key) = key {
            let marked = match status {
                DeliveryStatus::Sent => self.idempotency.mark_sent(key).await,
                _ => self.idempotency.mark_failed(key).await,
            };
            if let Err(e) = marked {
                warn!(idempotency_key = key, error = %e, "Failed to update idempotency status");
            }
        }

        let mut entry = CreateAuditLog::new("email", status)
            .with_metadata(serde_json::json!({ "email": task.email, "subject": task.subject }));
        if let Some(error) = error {
            entry = entry.with_error(error);
        }
        if let Err(log_err) = self.audit.record(entry).await {
            warn!(error = %log_err, "Failed to write audit log");
        }

        match outcome {
            Ok(()) => {
                info!(email = %task.email, "Email sent successfully");
                Ok(())
            }
            // Redelivery cannot fix the address.
            Err(TransportError::InvalidRecipient(reason)) => {
                error!(email = %task.email, error = %reason, "Recipient rejected, dead-lettering");
                Err(HandlerError::Poison(format!("invalid recipient address: {}", reason)))
            }
            Err(e) => {
                error!(email = %task.email, error = %e, "Failed to send email");
                Err(HandlerError::Delivery(e.to_string()))
            }
        }
    }
}

/// Checks cancellation before handing a payload to the dispatcher.
struct CancellableHandler<'a> {
    dispatcher: &'a TaskDispatcher,
    cancel: &'a CancellationToken,
}

#[async_trait]
impl MessageHandler for CancellableHandler<'_> {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        if self.cancel.is_cancelled() {
            info!("Context cancelled, stopping message processing");
            return Err(HandlerError::Cancelled);
        }

        self.dispatcher.dispatch(payload).await
    }
}

/// Long-running consumer that turns queued tasks into side effects.
pub struct DispatchWorker {
    queue: Arc<dyn Queue>,
    dispatcher: TaskDispatcher,
    state: watch::Sender<WorkerState>,
}

impl DispatchWorker {
    pub fn new(queue: Arc<dyn Queue>, dispatcher: TaskDispatcher) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);

        Self {
            queue,
            dispatcher,
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Consumes until `cancel` fires (`Ok`) or the broker channel closes (`Err`).
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        let started = self.state.send_if_modified(|state| {
            if *state == WorkerState::Created {
                *state = WorkerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(WorkerError::AlreadyStarted);
        }

        info!("Starting dispatch worker");

        let handler = CancellableHandler {
            dispatcher: &self.dispatcher,
            cancel: &cancel,
        };
        let result = self.queue.consume(&handler, cancel.clone()).await;

        self.state.send_replace(WorkerState::Stopping);

        let result = match result {
            Ok(()) => {
                info!("Worker context cancelled");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Worker consume loop terminated");
                Err(WorkerError::Queue(e))
            }
        };

        self.state.send_replace(WorkerState::Stopped);
        info!("Dispatch worker stopped");

        result
    }
}
