//! Port over the durable, at-least-once broker.
//!
//! Producers call [`Queue::publish`] with an opaque JSON payload; a single
//! consumer drives [`Queue::consume`], which settles every delivery according
//! to the handler's verdict:
//!
//! * `Ok(())` acknowledges the message.
//! * `Err(HandlerError::Poison)` moves it to the failed queue and acknowledges it.
//! * any other error negatively acknowledges it so the broker redelivers it.
//!
//! Handlers must therefore tolerate seeing the same payload more than once.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{HandlerError, QueueError};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueues one message. Returns once the broker has accepted it, or errors
    /// after a bounded wait.
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError>;

    /// Feeds deliveries to `handler` one at a time, in delivery order.
    ///
    /// Returns `Ok(())` when `cancel` fires between two messages and
    /// `Err(QueueError::ChannelClosed)` when the delivery stream ends. A
    /// message already handed to the handler is always settled first.
    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        cancel: CancellationToken,
    ) -> Result<(), QueueError>;
}
