use std::{fmt, time::Duration};

use thiserror::Error;
use uuid::Uuid;

use crate::models::profile::Channel;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("message was not accepted by the broker: {0}")]
    Publish(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to settle delivery {delivery_tag}: {reason}")]
    Settle { delivery_tag: u64, reason: String },

    #[error("consumer channel closed")]
    ChannelClosed,
}

/// Outcome of a message handler. Everything except `Poison` is requeued.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("consumption cancelled")]
    Cancelled,

    #[error("malformed task payload: {0}")]
    Decode(String),

    #[error("undecodable task payload: {0}")]
    Poison(String),

    #[error("side effect failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("smtp delivery failed: {0}")]
    Smtp(String),

    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
}

impl TransportError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(_) => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            TransportError::Smtp(_) => true,
            TransportError::InvalidRecipient(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid profile for {user_id}: {reason}")]
    InvalidProfile { user_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{op}: storage failure: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{op}: failed to publish task: {source}")]
    Publish {
        op: &'static str,
        #[source]
        source: QueueError,
    },

    #[error("{op}: failed to encode task: {source}")]
    Encode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("notification {0} not found")]
    NotFound(Uuid),

    #[error("invalid request: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker was already started")]
    AlreadyStarted,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// One failed (recipient, channel) leg of a smart send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegFailure {
    pub user_id: String,
    /// `None` when the recipient's profile could not be resolved.
    pub channel: Option<Channel>,
    pub reason: String,
}

impl fmt::Display for LegFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "user {} via {}: {}", self.user_id, channel, self.reason),
            None => write!(f, "user {}: {}", self.user_id, self.reason),
        }
    }
}

fn join_failures(failures: &[LegFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SmartSendError {
    #[error("failed to obtain identity token: {0}")]
    Auth(#[source] DirectoryError),

    #[error("some notifications failed ({} failures): {}", .failures.len(), join_failures(.failures))]
    Partial { failures: Vec<LegFailure> },
}

impl SmartSendError {
    pub fn failures(&self) -> &[LegFailure] {
        match self {
            SmartSendError::Partial { failures } => failures,
            SmartSendError::Auth(_) => &[],
        }
    }
}
