use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub custom: HashMap<String, String>,
    pub is_new: bool,
}

impl Notification {
    /// A fresh, unread record with a newly generated id.
    pub fn new(request: CreateNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            subject: request.subject,
            body: request.body,
            custom: request.custom,
            is_new: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmail {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartSendRequest {
    pub user_ids: Vec<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub custom: HashMap<String, String>,
}
