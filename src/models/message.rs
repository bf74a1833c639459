use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Envelope published to the failed queue for payloads that can never be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Original payload, kept as text when it is valid UTF-8.
    pub payload: String,
    pub failure_reason: String,
    pub failed_at: String,
}

impl DeadLetter {
    pub fn new(payload: &[u8], failure_reason: impl Into<String>) -> Self {
        Self {
            payload: String::from_utf8_lossy(payload).into_owned(),
            failure_reason: failure_reason.into(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
