use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::Notification;

/// Unit of work carried over the queue as `{"type": <kind>, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Email(EmailTask),
    Notification { data: Notification },
    DeleteNotification { id: Uuid },
    ReadNotification { id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTask {
    pub email: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskDecodeError {
    #[error("invalid task json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {kind} task: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Email(_) => "email",
            Task::Notification { .. } => "notification",
            Task::DeleteNotification { .. } => "delete_notification",
            Task::ReadNotification { .. } => "read_notification",
        }
    }

    /// Parses a queue payload and rejects shapes that deserialize but cannot be executed.
    pub fn decode(payload: &[u8]) -> Result<Self, TaskDecodeError> {
        let task: Task = serde_json::from_slice(payload)?;
        task.validate()?;
        Ok(task)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn validate(&self) -> Result<(), TaskDecodeError> {
        let invalid = |reason: &str| TaskDecodeError::Invalid {
            kind: self.kind(),
            reason: reason.to_string(),
        };

        match self {
            Task::Email(email) if email.email.trim().is_empty() => {
                Err(invalid("recipient address is empty"))
            }
            Task::Notification { data } if data.user_id.trim().is_empty() => {
                Err(invalid("user_id is empty"))
            }
            _ => Ok(()),
        }
    }
}
