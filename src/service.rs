use std::sync::Arc;

use lettre::Address;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::NotificationStore,
    config::{PublishFailurePolicy, ServiceConfig},
    error::ServiceError,
    models::{
        notification::{CreateNotification, Notification, SendEmail},
        task::{EmailTask, Task},
    },
    queue::Queue,
};

/// Write path for notifications: persists state, then hands slow work to the queue.
pub struct NotificationService {
    queue: Arc<dyn Queue>,
    storage: Arc<dyn NotificationStore>,
    config: ServiceConfig,
}

impl NotificationService {
    pub fn new(
        queue: Arc<dyn Queue>,
        storage: Arc<dyn NotificationStore>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            queue,
            storage,
            config,
        }
    }

    async fn publish(&self, op: &'static str, task: &Task) -> Result<(), ServiceError> {
        let payload = task
            .encode()
            .map_err(|source| ServiceError::Encode { op, source })?;

        self.queue
            .publish(&payload)
            .await
            .map_err(|source| ServiceError::Publish { op, source })
    }

    /// Publishes a task whose failure is governed by `policy`.
    async fn publish_side_task(
        &self,
        op: &'static str,
        task: &Task,
        policy: PublishFailurePolicy,
    ) -> Result<(), ServiceError> {
        match self.publish(op, task).await {
            Ok(()) => Ok(()),
            Err(e) if policy == PublishFailurePolicy::Swallow => {
                warn!(op, kind = task.kind(), error = %e, "Downstream task dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn send_message(&self, request: SendEmail, email: &str) -> Result<(), ServiceError> {
        const OP: &str = "service.send_message";

        if email.trim().is_empty() {
            return Err(ServiceError::Validation("recipient address is empty".to_string()));
        }
        if let Err(e) = email.parse::<Address>() {
            return Err(ServiceError::Validation(format!(
                "invalid recipient address {}: {}",
                email, e
            )));
        }

        let task = Task::Email(EmailTask {
            email: email.to_string(),
            subject: request.subject,
            body: request.body,
            idempotency_key: Some(Uuid::new_v4().to_string()),
        });

        self.publish(OP, &task).await.inspect_err(|e| {
            error!(op = OP, error = %e, "Failed to publish email to queue");
        })?;

        info!(op = OP, "Email task published");
        Ok(())
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, ServiceError> {
        const OP: &str = "service.notifications";

        let notifications = self
            .storage
            .all()
            .await
            .map_err(|source| ServiceError::Storage { op: OP, source })?;

        debug!(op = OP, count = notifications.len(), "Notifications retrieved");
        Ok(notifications)
    }

    pub async fn notification(&self, id: Uuid) -> Result<Notification, ServiceError> {
        const OP: &str = "service.notification";

        self.storage
            .get(id)
            .await
            .map_err(|source| ServiceError::Storage { op: OP, source })?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Persists a new unread notification and publishes it downstream.
    ///
    /// The insert and the publish are not atomic: when the publish fails the
    /// row stays committed and the error is still returned.
    pub async fn create_notification(
        &self,
        request: CreateNotification,
    ) -> Result<Uuid, ServiceError> {
        const OP: &str = "service.create_notification";

        if request.user_id.trim().is_empty() {
            return Err(ServiceError::Validation("user_id is empty".to_string()));
        }

        let notification = Notification::new(request);
        let id = notification.id;

        self.storage
            .insert(&notification)
            .await
            .map_err(|source| ServiceError::Storage { op: OP, source })?;

        let task = Task::Notification { data: notification };
        if let Err(e) = self.publish(OP, &task).await {
            error!(op = OP, id = %id, error = %e, "Notification committed but not published");
            return Err(e);
        }

        info!(op = OP, id = %id, "Notification created and published");
        Ok(id)
    }

    pub async fn delete_notification(&self, id: Uuid) -> Result<(), ServiceError> {
        const OP: &str = "service.delete_notification";

        self.storage
            .delete(id)
            .await
            .map_err(|source| ServiceError::Storage { op: OP, source })?;

        self.publish_side_task(
            OP,
            &Task::DeleteNotification { id },
            self.config.delete_publish_failure,
        )
        .await?;

        info!(op = OP, id = %id, "Notification deleted");
        Ok(())
    }

    /// Returns the recipient's unread notifications and marks them read.
    ///
    /// Stops at the first failing flip; records flipped before it stay read.
    pub async fn notifications_by_recipient(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, ServiceError> {
        const OP: &str = "service.notifications_by_recipient";

        let notifications = self
            .storage
            .by_recipient(user_id)
            .await
            .map_err(|source| ServiceError::Storage { op: OP, source })?;

        let mut unread = Vec::new();

        for notification in notifications.into_iter().filter(|n| n.is_new) {
            let flipped = self
                .storage
                .mark_read(notification.id)
                .await
                .map_err(|source| ServiceError::Storage { op: OP, source })?;

            // Another reader got there first.
            if !flipped {
                continue;
            }

            self.publish_side_task(
                OP,
                &Task::ReadNotification { id: notification.id },
                self.config.read_publish_failure,
            )
            .await?;

            unread.push(notification);
        }

        debug!(op = OP, user_id, count = unread.len(), "Unread notifications retrieved");
        Ok(unread)
    }
}
