use async_trait::async_trait;

use crate::models::CheckoutOutcome;
use crate::utils::error::Result;

/// Site-specific purchase flow run when a target comes back in stock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutProcedure: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the flow for `target_id`. An `Err` is treated by the dispatcher as a failed checkout.
    async fn checkout(&self, target_id: &str) -> Result<CheckoutOutcome>;
}
