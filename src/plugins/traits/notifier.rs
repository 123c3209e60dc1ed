use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{CheckoutOutcome, ContinueSignal, StopReason, TransitionEvent};
use crate::utils::error::Result;

/// Something worth telling the operator about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Transition {
        event: TransitionEvent,
    },
    CheckoutFinished {
        target_id: String,
        outcome: CheckoutOutcome,
        signal: ContinueSignal,
        elapsed_ms: u64,
    },
    TargetStopped {
        target_id: String,
        reason: StopReason,
    },
}

impl Notification {
    pub fn target_id(&self) -> &str {
        match self {
            Notification::Transition { event } => &event.target_id,
            Notification::CheckoutFinished { target_id, .. } => target_id,
            Notification::TargetStopped { target_id, .. } => target_id,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Notification::Transition { event } => format!("🚨 Restock detected: {}", event.target_id),
            Notification::CheckoutFinished { target_id, outcome, .. } => match outcome {
                CheckoutOutcome::Success => format!("🛒 Checkout handed off: {}", target_id),
                CheckoutOutcome::Failure { .. } => format!("❌ Checkout failed: {}", target_id),
                CheckoutOutcome::Skipped { .. } => format!("⏭️ Checkout skipped: {}", target_id),
            },
            Notification::TargetStopped { target_id, .. } => format!("🏁 Stopped watching: {}", target_id),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::Transition { event } => format!(
                "Target {} became available after {} polls.\nSignal: {}\nObserved at: {}",
                event.target_id,
                event.status.poll_count,
                event.status.raw_signal,
                event.status.observed_at.to_rfc3339()
            ),
            Notification::CheckoutFinished { outcome, signal, elapsed_ms, .. } => format!(
                "Outcome: {}\nTook: {:.2}s\nWatching: {}",
                outcome,
                *elapsed_ms as f64 / 1000.0,
                if signal.should_continue() { "resumed" } else { "stopped" }
            ),
            Notification::TargetStopped { reason, .. } => format!("Reason: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Trait for operator-facing outputs (log, Discord, email).
///
/// Sinks are a side channel only: their results never influence the watch state machine.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn sink_type(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult>;

    /// Plugin lifecycle
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
