use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    clients::ChatBot, config::Config, error::TransportError, models::retry::RetryConfig,
    utils::retry_with_backoff_when,
};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: String,
    parse_mode: &'a str,
}

/// Chat-bot push over the bot platform's `sendMessage` endpoint.
pub struct BotClient {
    http_client: Client,
    send_url: String,
    retry_config: RetryConfig,
}

impl BotClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_endpoint(&config.bot_api_url, &config.bot_token, config.retry_config())
    }

    pub fn with_endpoint(api_url: &str, token: &str, retry_config: RetryConfig) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!(api_url, "Chat bot client initialized");

        Ok(Self {
            http_client,
            send_url: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token),
            retry_config,
        })
    }

    async fn send_once(&self, request: &SendMessageRequest<'_>) -> Result<(), TransportError> {
        let response = self.http_client.post(&self.send_url).json(request).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                service: "bot api",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl ChatBot for BotClient {
    async fn send_message(&self, chat_id: i64, title: &str, body: &str) -> Result<(), TransportError> {
        debug!(chat_id, "Sending chat bot message");

        let request = SendMessageRequest {
            chat_id,
            text: format!("{}\n\n{}", title, body),
            parse_mode: "HTML",
        };

        retry_with_backoff_when(&self.retry_config, TransportError::is_transient, || {
            self.send_once(&request)
        })
        .await?;

        info!(chat_id, "Chat bot message sent");
        Ok(())
    }
}
