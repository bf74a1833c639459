use std::time::{Duration, Instant};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clients::health::HealthProbe,
    config::Config,
    error::{HandlerError, QueueError},
    models::message::DeadLetter,
    queue::{MessageHandler, Queue},
};

const CONSUMER_TAG: &str = "dispatch_worker";
const PERSISTENT: u8 = 2;

pub struct RabbitMqClient {
    connection: Connection,
    publisher: Channel,
    consumer: Channel,
    queue_name: String,
    failed_queue_name: String,
    publish_timeout: Duration,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let publisher = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ publisher channel creation failed: {}", e))?;

        publisher
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        let consumer = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ consumer channel creation failed: {}", e))?;

        consumer
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        for queue in [&config.queue_name, &config.failed_queue_name] {
            publisher
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;
        }

        info!(
            queue = %config.queue_name,
            failed_queue = %config.failed_queue_name,
            prefetch = config.prefetch_count,
            "RabbitMQ connection established"
        );

        Ok(Self {
            connection,
            publisher,
            consumer,
            queue_name: config.queue_name.clone(),
            failed_queue_name: config.failed_queue_name.clone(),
            publish_timeout: config.publish_timeout(),
        })
    }

    async fn publish_to(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        let confirmed = async {
            self.publisher
                .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
                .await?
                .await
        };

        match timeout(self.publish_timeout, confirmed).await {
            Err(_) => Err(QueueError::Timeout(self.publish_timeout)),
            Ok(Err(e)) => Err(QueueError::Publish(e.to_string())),
            Ok(Ok(confirmation)) if confirmation.is_nack() => Err(QueueError::Publish(
                format!("broker nacked message for {}", queue),
            )),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), QueueError> {
        self.consumer
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::Settle {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn requeue(&self, delivery_tag: u64) -> Result<(), QueueError> {
        self.consumer
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: true,
                },
            )
            .await
            .map_err(|e| QueueError::Settle {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn dead_letter(&self, delivery_tag: u64, payload: &[u8], reason: String) -> Result<(), QueueError> {
        let message = DeadLetter::new(payload, reason);
        let encoded = serde_json::to_vec(&message).map_err(|e| QueueError::Publish(e.to_string()))?;

        match self.publish_to(&self.failed_queue_name, &encoded).await {
            Ok(()) => {
                warn!(
                    delivery_tag,
                    reason = %message.failure_reason,
                    "Message moved to failed queue"
                );
                self.acknowledge(delivery_tag).await
            }
            Err(e) => {
                error!(delivery_tag, error = %e, "Failed to dead-letter message, requeueing");
                self.requeue(delivery_tag).await
            }
        }
    }
}

#[async_trait]
impl Queue for RabbitMqClient {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        self.publish_to(&self.queue_name, payload).await
    }

    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        let mut consumer = self
            .consumer
            .basic_consume(
                &self.queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Connection(format!("failed to register consumer: {}", e)))?;

        info!(queue = %self.queue_name, "Started consuming messages from queue");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(queue = %self.queue_name, "Consumption cancelled");
                    return Ok(());
                }
                next = consumer.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(queue = %self.queue_name, error = %e, "Consumer stream failed");
                    return Err(QueueError::ChannelClosed);
                }
                None => {
                    warn!(queue = %self.queue_name, "Message channel closed");
                    return Err(QueueError::ChannelClosed);
                }
            };

            let delivery_tag = delivery.delivery_tag;
            debug!(delivery_tag, redelivered = delivery.redelivered, "Received message");

            match handler.handle(&delivery.data).await {
                Ok(()) => self.acknowledge(delivery_tag).await?,
                Err(HandlerError::Poison(reason)) => {
                    self.dead_letter(delivery_tag, &delivery.data, reason).await?
                }
                Err(e) => {
                    warn!(delivery_tag, error = %e, "Failed to process message, requeueing");
                    self.requeue(delivery_tag).await?
                }
            }
        }
    }
}

#[async_trait]
impl HealthProbe for RabbitMqClient {
    fn name(&self) -> &'static str {
        "message_broker"
    }

    async fn probe(&self) -> Result<u64, String> {
        let start = Instant::now();

        if self.connection.status().connected() && self.publisher.status().connected() {
            Ok(start.elapsed().as_millis() as u64)
        } else {
            Err("connection to broker is not open".to_string())
        }
    }
}
