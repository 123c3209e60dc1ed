use serde::{Deserialize, Serialize};
use std::fmt;

pub mod checkout;
pub mod session;
pub mod stock;
pub mod target;

// Re-exports for convenience
pub use checkout::*;
pub use session::*;
pub use stock::*;
pub use target::*;

// Common enums used across models

/// Which marker layout a target's page uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// A purchase control whose CSS class flips between an "unavailable" and an "available" fragment.
    ClassToggle,
    /// A button whose label flips between a "notify me" and a "buy" wording.
    LabelToggle,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::ClassToggle => "class_toggle",
            ClassifierKind::LabelToggle => "label_toggle",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the first classification of a watch is treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InitialAvailability {
    /// Already available at watch start is reported as a status only, never as a transition.
    #[default]
    Report,
    /// An unset previous status counts as unavailable, so availability at watch start fires.
    Trigger,
}

/// Lifecycle of a single target's watch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    Watching,
    Reacting,
    Stopped,
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchState::Watching => "watching",
            WatchState::Reacting => "reacting",
            WatchState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
