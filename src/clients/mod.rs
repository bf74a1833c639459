//! Outbound collaborators and the traits the core talks to them through.

pub mod bot;
pub mod database;
pub mod health;
pub mod identity;
pub mod rbmq;
pub mod redis;
pub mod smtp;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::{DirectoryError, StoreError, TransportError},
    models::{
        audit::CreateAuditLog, notification::Notification, profile::Profile,
        status::IdempotencyStatus,
    },
};

/// Row store for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn all(&self) -> Result<Vec<Notification>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    async fn by_recipient(&self, user_id: &str) -> Result<Vec<Notification>, StoreError>;

    async fn insert(&self, notification: &Notification) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Clears `is_new`. Returns `false` if the record was already read.
    async fn mark_read(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: CreateAuditLog) -> Result<(), StoreError>;
}

/// Delivery state keyed by a task's idempotency key.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn status(&self, key: &str) -> Result<IdempotencyStatus, StoreError>;

    async fn mark_processing(&self, key: &str) -> Result<(), StoreError>;

    async fn mark_sent(&self, key: &str) -> Result<(), StoreError>;

    async fn mark_failed(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait ChatBot: Send + Sync {
    async fn send_message(&self, chat_id: i64, title: &str, body: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Exchanges service credentials for a bearer token.
    async fn access_token(&self) -> Result<String, DirectoryError>;

    async fn profile(&self, token: &str, user_id: &str) -> Result<Profile, DirectoryError>;
}
