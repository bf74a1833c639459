use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::{status::DeliveryStatus, task::Task};

#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub task_kind: String,
    pub notification_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub metadata: JsonValue,
}

impl CreateAuditLog {
    pub fn new(task_kind: &str, status: DeliveryStatus) -> Self {
        Self {
            task_kind: task_kind.to_string(),
            notification_id: None,
            user_id: None,
            status,
            error_message: None,
            metadata: serde_json::json!({}),
        }
    }

    /// Audit entry for a task that only has to be recorded downstream.
    pub fn for_lifecycle(task: &Task) -> Self {
        let entry = Self::new(task.kind(), DeliveryStatus::Recorded);

        match task {
            Task::Notification { data } => entry
                .with_notification(data.id)
                .with_user(data.user_id.clone())
                .with_metadata(serde_json::json!({ "subject": data.subject })),
            Task::DeleteNotification { id } | Task::ReadNotification { id } => {
                entry.with_notification(*id)
            }
            Task::Email(email) => entry.with_metadata(serde_json::json!({ "email": email.email })),
        }
    }

    pub fn with_notification(mut self, id: Uuid) -> Self {
        self.notification_id = Some(id);
        self
    }

    pub fn with_user(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}
