use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a classifier decided from one render state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub available: bool,
    pub raw_signal: String,
}

impl Classification {
    pub fn available(raw_signal: impl Into<String>) -> Self {
        Self {
            available: true,
            raw_signal: raw_signal.into(),
        }
    }

    pub fn unavailable(raw_signal: impl Into<String>) -> Self {
        Self {
            available: false,
            raw_signal: raw_signal.into(),
        }
    }
}

/// Stock status of a target as observed by one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockStatus {
    pub available: bool,
    pub raw_signal: String,
    pub observed_at: DateTime<Utc>,
    pub poll_count: u64,
}

impl StockStatus {
    pub fn from_classification(classification: Classification, poll_count: u64) -> Self {
        Self {
            available: classification.available,
            raw_signal: classification.raw_signal,
            observed_at: Utc::now(),
            poll_count,
        }
    }

    /// Status recorded for a poll whose render state could not be read or classified.
    pub fn failed(reason: impl std::fmt::Display, poll_count: u64) -> Self {
        Self {
            available: false,
            raw_signal: format!("error: {}", reason),
            observed_at: Utc::now(),
            poll_count,
        }
    }

    pub fn label(&self) -> &'static str {
        if self.available {
            "in stock"
        } else {
            "out of stock"
        }
    }
}

/// Emitted once per unavailable -> available edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: Uuid,
    pub target_id: String,
    pub status: StockStatus,
}

impl TransitionEvent {
    pub fn new(target_id: impl Into<String>, status: StockStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            status,
        }
    }
}
