use std::time::Instant;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{info, warn};

use crate::{
    clients::{IdempotencyStore, health::HealthProbe},
    config::Config,
    error::StoreError,
    models::{retry::RetryConfig, status::IdempotencyStatus},
    utils::retry_with_backoff,
};

pub struct RedisClient {
    connection: MultiplexedConnection,
    idempotency_ttl_seconds: u64,
    retry_config: RetryConfig,
}

impl RedisClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            idempotency_ttl_seconds: config.idempotency_ttl_seconds,
            retry_config: config.retry_config(),
        })
    }

    fn key(idempotency_key: &str) -> String {
        format!("idempotency:email:{}", idempotency_key)
    }

    async fn set_status(&self, idempotency_key: &str, status: &'static str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();

        connection
            .set_ex::<_, _, ()>(Self::key(idempotency_key), status, self.idempotency_ttl_seconds)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn status(&self, idempotency_key: &str) -> Result<IdempotencyStatus, StoreError> {
        let mut connection = self.connection.clone();
        let key = Self::key(idempotency_key);

        let value: Option<String> = connection.get(&key).await?;
        let status = IdempotencyStatus::from_cached(value.as_deref());

        if status == IdempotencyStatus::NotFound && value.is_some() {
            warn!(key = %key, "Unknown idempotency status, treating as not found");
        }

        Ok(status)
    }

    async fn mark_processing(&self, idempotency_key: &str) -> Result<(), StoreError> {
        self.set_status(idempotency_key, "processing").await
    }

    async fn mark_sent(&self, idempotency_key: &str) -> Result<(), StoreError> {
        // A lost "sent" marker means a duplicate email on redelivery.
        retry_with_backoff(&self.retry_config, || self.set_status(idempotency_key, "sent")).await
    }

    async fn mark_failed(&self, idempotency_key: &str) -> Result<(), StoreError> {
        self.set_status(idempotency_key, "failed").await
    }
}

#[async_trait]
impl HealthProbe for RedisClient {
    fn name(&self) -> &'static str {
        "cache_service"
    }

    async fn probe(&self) -> Result<u64, String> {
        let start = Instant::now();
        let mut connection = self.connection.clone();

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map_err(|e| format!("Ping failed: {}", e))?;

        Ok(start.elapsed().as_millis() as u64)
    }
}
