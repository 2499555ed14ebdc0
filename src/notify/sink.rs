//! Notification delivery interface

use crate::types::Notification;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Hands notifications to whatever delivers them (push, email, inbox)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Sink that only logs; used when no delivery service is configured
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            "Notification for {} ({:?}): {}",
            notification.user_id, notification.kind, notification.title
        );
        Ok(())
    }
}

/// Mock sink for testing
#[derive(Debug, Default)]
pub struct MockNotificationSink {
    delivered: std::sync::Mutex<Vec<Notification>>,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all delivered notifications (for testing)
    pub fn get_notifications(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    /// Clear delivered notifications (for testing)
    pub fn clear(&self) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.clear();
        }
    }
}

#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification);
        }
        Ok(())
    }
}
