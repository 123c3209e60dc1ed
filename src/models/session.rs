use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{InitialAvailability, StockStatus, TransitionEvent, WatchState};

/// True when `current` completes an unavailable -> available edge.
///
/// An unset `previous` only counts as unavailable under [`InitialAvailability::Trigger`].
pub fn is_transition(
    previous: Option<&StockStatus>,
    current: &StockStatus,
    policy: InitialAvailability,
) -> bool {
    if !current.available {
        return false;
    }
    match previous {
        Some(prev) => !prev.available,
        None => policy == InitialAvailability::Trigger,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The transition handler asked to stop (checkout succeeded or fail-fast).
    Handler,
    Cancelled,
    Fatal { message: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Handler => f.write_str("stopped by transition handler"),
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::Fatal { message } => write!(f, "fatal: {}", message),
        }
    }
}

/// Per-target state owned by exactly one watch loop.
#[derive(Debug, Clone)]
pub struct WatchSession {
    pub id: Uuid,
    pub target_id: String,
    pub last_status: Option<StockStatus>,
    pub state: WatchState,
    pub poll_count: u64,
    pub transitions: u64,
    pub failed_polls: u64,
    pub consecutive_failures: u64,
    pub started_at: DateTime<Utc>,
}

impl WatchSession {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            last_status: None,
            state: WatchState::Watching,
            poll_count: 0,
            transitions: 0,
            failed_polls: 0,
            consecutive_failures: 0,
            started_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != WatchState::Stopped
    }

    /// Advances the poll counter and returns the number for the upcoming attempt.
    pub fn next_poll(&mut self) -> u64 {
        self.poll_count += 1;
        self.poll_count
    }

    /// Stores `status` as the latest observation and returns the event it triggers, if any.
    pub fn record(
        &mut self,
        status: StockStatus,
        policy: InitialAvailability,
    ) -> Option<TransitionEvent> {
        let fired = is_transition(self.last_status.as_ref(), &status, policy);
        self.last_status = Some(status.clone());

        if fired {
            self.transitions += 1;
            Some(TransitionEvent::new(self.target_id.clone(), status))
        } else {
            None
        }
    }

    /// Returns the length of the current failure streak, including this one.
    pub fn record_failure(&mut self) -> u64 {
        self.failed_polls += 1;
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// Ends a failure streak and returns how long it was.
    pub fn clear_failures(&mut self) -> u64 {
        std::mem::take(&mut self.consecutive_failures)
    }

    pub fn begin_reaction(&mut self) {
        if self.is_active() {
            self.state = WatchState::Reacting;
        }
    }

    pub fn resume(&mut self) {
        if self.is_active() {
            self.state = WatchState::Watching;
        }
    }

    pub fn stop(&mut self) {
        self.state = WatchState::Stopped;
    }

    pub fn report(&self, stop_reason: StopReason) -> WatchReport {
        WatchReport {
            session_id: self.id,
            target_id: self.target_id.clone(),
            state: self.state,
            stop_reason,
            polls: self.poll_count,
            transitions: self.transitions,
            failed_polls: self.failed_polls,
            last_status: self.last_status.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Snapshot of a session at the moment its loop exited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchReport {
    pub session_id: Uuid,
    pub target_id: String,
    pub state: WatchState,
    pub stop_reason: StopReason,
    pub polls: u64,
    pub transitions: u64,
    pub failed_polls: u64,
    pub last_status: Option<StockStatus>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
