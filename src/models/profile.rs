use std::{collections::HashMap, fmt};

use serde::Deserialize;

use crate::error::DirectoryError;

pub const CHANNELS_ATTRIBUTE: &str = "notification_channels";
pub const CHAT_ID_ATTRIBUTE: &str = "telegram_id";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    /// In-app notification record.
    Notification,
    /// Chat-bot push.
    Telegram,
    Unknown(String),
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        match name.trim() {
            "email" => Channel::Email,
            "notification" | "websocket" => Channel::Notification,
            "telegram" => Channel::Telegram,
            other => Channel::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Notification => write!(f, "notification"),
            Channel::Telegram => write!(f, "telegram"),
            Channel::Unknown(name) => write!(f, "{}", name),
        }
    }
}

/// User record as returned by the identity provider's admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRepresentation {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub channels: Vec<Channel>,
    pub chat_ids: Vec<String>,
}

impl Profile {
    /// First configured chat id, if it parses as a numeric bot destination.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_ids.first()?.trim().parse().ok()
    }
}

impl TryFrom<UserRepresentation> for Profile {
    type Error = DirectoryError;

    fn try_from(user: UserRepresentation) -> Result<Self, Self::Error> {
        let mut attributes = user.attributes;

        let channels = attributes
            .remove(CHANNELS_ATTRIBUTE)
            .ok_or_else(|| DirectoryError::InvalidProfile {
                user_id: user.id.clone(),
                reason: format!("{} missing", CHANNELS_ATTRIBUTE),
            })?
            .iter()
            .filter(|name| !name.trim().is_empty())
            .map(|name| Channel::from(name.as_str()))
            .collect();

        Ok(Self {
            id: user.id,
            email: user.email.filter(|email| !email.trim().is_empty()),
            channels,
            chat_ids: attributes.remove(CHAT_ID_ATTRIBUTE).unwrap_or_default(),
        })
    }
}
