use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

/// What the worker does with a payload that can never be decoded.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Negatively acknowledge and let the broker redeliver it.
    #[default]
    Requeue,
    /// Move it to the failed queue and acknowledge it.
    DeadLetter,
}

/// Whether a failed best-effort publish is reported to the caller.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishFailurePolicy {
    Swallow,
    Surface,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default = "default_failed_queue_name")]
    pub failed_queue_name: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    pub database_url: String,

    pub redis_url: String,
    #[serde(default = "default_idempotency_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,

    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    #[serde(default = "default_true")]
    pub smtp_use_tls: bool,
    pub admin_email: String,

    #[serde(default = "default_bot_api_url")]
    pub bot_api_url: String,
    pub bot_token: String,

    pub identity_token_url: String,
    pub identity_users_url: String,
    pub identity_client_id: String,
    pub identity_client_secret: String,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,

    #[serde(default)]
    pub decode_failure_policy: DecodeFailurePolicy,
    #[serde(default = "default_delete_publish_failure")]
    pub delete_publish_failure: PublishFailurePolicy,
    #[serde(default = "default_read_publish_failure")]
    pub read_publish_failure: PublishFailurePolicy,

    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Publish-failure handling for the notification write paths.
#[derive(Clone, Copy, Debug)]
pub struct ServiceConfig {
    pub delete_publish_failure: PublishFailurePolicy,
    pub read_publish_failure: PublishFailurePolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            delete_publish_failure: default_delete_publish_failure(),
            read_publish_failure: default_read_publish_failure(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub use_tls: bool,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub token_url: String,
    pub users_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.fanout_concurrency == 0 {
            return Err(anyhow!("FANOUT_CONCURRENCY must be at least 1"));
        }

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            delete_publish_failure: self.delete_publish_failure,
            read_publish_failure: self.read_publish_failure,
        }
    }

    pub fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from: self.smtp_from.clone(),
            use_tls: self.smtp_use_tls,
        }
    }

    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            token_url: self.identity_token_url.clone(),
            users_url: self.identity_users_url.clone(),
            client_id: self.identity_client_id.clone(),
            client_secret: self.identity_client_secret.clone(),
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

fn default_queue_name() -> String {
    "notifications".to_string()
}

fn default_failed_queue_name() -> String {
    "notifications.failed".to_string()
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_publish_timeout_ms() -> u64 {
    5_000
}

fn default_idempotency_ttl_seconds() -> u64 {
    86_400
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_bot_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    200
}

fn default_max_retry_delay_ms() -> u64 {
    5_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_fanout_concurrency() -> usize {
    16
}

fn default_delete_publish_failure() -> PublishFailurePolicy {
    PublishFailurePolicy::Swallow
}

fn default_read_publish_failure() -> PublishFailurePolicy {
    PublishFailurePolicy::Surface
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

fn default_server_port() -> u16 {
    8080
}
