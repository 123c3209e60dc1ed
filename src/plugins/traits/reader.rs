use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Target;
use crate::utils::error::Result;

/// Rendered markup of a target's page at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderState {
    pub target_id: String,
    pub url: String,
    pub html: String,
    pub captured_at: DateTime<Utc>,
}

impl RenderState {
    pub fn new(target_id: impl Into<String>, url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            url: url.into(),
            html: html.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Source of a target's current render state (a browser tab, a fixture, ...).
///
/// Implementations must tolerate concurrent calls for different targets.
#[async_trait]
pub trait RenderStateReader: Send + Sync {
    fn name(&self) -> &str;

    /// Acquires whatever the reader needs for `target` (open a tab, navigate).
    async fn attach(&self, target: &Target) -> Result<()>;

    /// Reads the current state.
    ///
    /// Errors are `AppError::RenderUnavailable` when the page just could not be read this time,
    /// and `AppError::FatalResource` when the underlying session is gone.
    async fn read(&self, target: &Target) -> Result<RenderState>;

    /// Releases what `attach` acquired. Called once when the watch loop exits.
    async fn release(&self, target: &Target) -> Result<()>;
}
