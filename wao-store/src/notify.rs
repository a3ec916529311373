//! Notification collaborator
//!
//! Mutating workflows announce what happened as `{event, data}` messages.
//! Delivery is fire-and-forget: a failed notification is logged and never
//! affects the operation that produced it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::NotificationConfig;
use crate::error::{Error, Result};

/// Message delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: String,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Build a notification from any serialisable payload
    pub fn json<T: Serialize>(event: impl Into<String>, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| Error::Validation(format!("notification payload: {}", e)))?;
        Ok(Self::new(event, data))
    }
}

/// Delivers notifications to whoever is listening
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// In-process fan-out over a tokio broadcast channel
///
/// Subscribers that fall more than `channel_capacity` messages behind skip
/// the oldest ones.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(config: &NotificationConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(&NotificationConfig::default())
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        // No subscribers is not a failure.
        match self.sender.send(notification) {
            Ok(delivered) => {
                tracing::debug!(receivers = delivered, "notification sent");
            }
            Err(broadcast::error::SendError(n)) => {
                tracing::debug!(event = %n.event, "notification dropped, no subscribers");
            }
        }
        Ok(())
    }
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: Notification) -> Result<()> {
        Ok(())
    }
}

/// Send without waiting; failures are logged and swallowed.
pub fn notify_in_background(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        let event = notification.event.clone();
        if let Err(e) = notifier.notify(notification).await {
            tracing::warn!(event = %event, error = %e, "notification failed");
        }
    });
}
