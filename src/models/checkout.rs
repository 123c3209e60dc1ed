use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one run of the external checkout procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// The purchase was completed or handed off to the operator.
    Success,
    Failure { reason: String },
    /// Nothing was attempted, e.g. auto-checkout is off or a confirmation was declined.
    Skipped { reason: String },
}

impl CheckoutOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        CheckoutOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        CheckoutOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutOutcome::Success => "success",
            CheckoutOutcome::Failure { .. } => "failure",
            CheckoutOutcome::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for CheckoutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutOutcome::Success => f.write_str("success"),
            CheckoutOutcome::Failure { reason } => write!(f, "failure ({})", reason),
            CheckoutOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// Whether a watch loop keeps polling after reacting to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinueSignal {
    Continue,
    Stop,
}

impl ContinueSignal {
    pub fn should_continue(&self) -> bool {
        matches!(self, ContinueSignal::Continue)
    }
}

/// One action of a scripted checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CheckoutStep {
    Navigate { url: String },
    Click {
        selector: String,
        #[serde(default)]
        optional: bool,
    },
    /// Clicks the first visible button-like element whose text contains `text` (case-insensitive).
    ClickText {
        text: String,
        #[serde(default)]
        optional: bool,
    },
    WaitFor { selector: String },
    Pause { millis: u64 },
}

impl CheckoutStep {
    pub fn is_optional(&self) -> bool {
        match self {
            CheckoutStep::Click { optional, .. } | CheckoutStep::ClickText { optional, .. } => {
                *optional
            }
            _ => false,
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutStep::Navigate { url } => write!(f, "navigate to {}", url),
            CheckoutStep::Click { selector, .. } => write!(f, "click '{}'", selector),
            CheckoutStep::ClickText { text, .. } => write!(f, "click text '{}'", text),
            CheckoutStep::WaitFor { selector } => write!(f, "wait for '{}'", selector),
            CheckoutStep::Pause { millis } => write!(f, "pause {}ms", millis),
        }
    }
}
