use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// Outcome recorded in the delivery audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Recorded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyStatus {
    NotFound,
    Processing,
    Sent,
    Failed,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Recorded => write!(f, "recorded"),
        }
    }
}

impl IdempotencyStatus {
    pub fn from_cached(value: Option<&str>) -> Self {
        match value {
            Some("processing") => IdempotencyStatus::Processing,
            Some("sent") => IdempotencyStatus::Sent,
            Some("failed") => IdempotencyStatus::Failed,
            _ => IdempotencyStatus::NotFound,
        }
    }
}
