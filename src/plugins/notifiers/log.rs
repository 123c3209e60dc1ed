use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::CheckoutOutcome;
use crate::plugins::traits::{Notification, NotificationResult, NotificationSink};
use crate::utils::error::Result;

/// Writes every notification to the tracing log. Always registered.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LogNotifier {
    fn name(&self) -> &str {
        "Log Notifier"
    }

    fn sink_type(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult> {
        let target_id = notification.target_id();
        let body = notification.body().replace('\n', " | ");

        match notification {
            Notification::CheckoutFinished {
                outcome: CheckoutOutcome::Failure { .. },
                ..
            } => warn!(target_id, "{}: {}", notification.title(), body),
            _ => info!(target_id, "{}: {}", notification.title(), body),
        }

        Ok(NotificationResult {
            success: true,
            message_id: None,
            error: None,
        })
    }
}
