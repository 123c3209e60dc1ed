use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::DispatcherConfig;
use crate::models::{CheckoutOutcome, ContinueSignal, TransitionEvent};
use crate::plugins::traits::{CheckoutProcedure, Notification};
use crate::plugins::PluginManager;
use crate::utils::error::Result;
use crate::watcher::TransitionHandler;

/// What happened when a transition was handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub outcome: CheckoutOutcome,
    pub signal: ContinueSignal,
    pub elapsed_ms: u64,
}

/// Turns transition events into checkout attempts and a continue/stop decision.
#[derive(Clone)]
pub struct ReactionDispatcher {
    checkout: Arc<dyn CheckoutProcedure>,
    plugins: PluginManager,
    stop_on_failure: bool,
}

impl ReactionDispatcher {
    pub fn new(
        checkout: Arc<dyn CheckoutProcedure>,
        plugins: PluginManager,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            checkout,
            plugins,
            stop_on_failure: config.stop_on_failure,
        }
    }

    /// Success stops the watch; Skipped resumes it; Failure resumes unless `stop_on_failure`.
    pub fn decide(&self, outcome: &CheckoutOutcome) -> ContinueSignal {
        match outcome {
            CheckoutOutcome::Success => ContinueSignal::Stop,
            CheckoutOutcome::Failure { .. } if self.stop_on_failure => ContinueSignal::Stop,
            CheckoutOutcome::Failure { .. } | CheckoutOutcome::Skipped { .. } => {
                ContinueSignal::Continue
            }
        }
    }

    pub async fn handle(&self, event: TransitionEvent) -> ContinueSignal {
        self.react(event).await.signal
    }

    /// Runs the checkout for `event` and broadcasts the result to every sink.
    pub async fn react(&self, event: TransitionEvent) -> Reaction {
        let target_id = event.target_id.clone();
        let started = Instant::now();
        let alert = Notification::Transition { event };

        let (_, result) = tokio::join!(
            self.plugins.broadcast(&alert),
            self.checkout.checkout(&target_id)
        );
        let outcome = Self::outcome_from(result);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let signal = self.decide(&outcome);

        metrics::counter!("restock_checkouts_total", "outcome" => outcome.as_str()).increment(1);
        match &outcome {
            CheckoutOutcome::Failure { reason } => warn!(
                target_id = %target_id,
                elapsed_ms,
                ?signal,
                "Checkout failed: {}",
                reason
            ),
            _ => info!(
                target_id = %target_id,
                elapsed_ms,
                ?signal,
                "Checkout finished: {}",
                outcome
            ),
        }

        self.plugins
            .broadcast(&Notification::CheckoutFinished {
                target_id,
                outcome: outcome.clone(),
                signal,
                elapsed_ms,
            })
            .await;

        Reaction {
            outcome,
            signal,
            elapsed_ms,
        }
    }

    fn outcome_from(result: Result<CheckoutOutcome>) -> CheckoutOutcome {
        result.unwrap_or_else(|e| CheckoutOutcome::failure(e.to_string()))
    }
}

#[async_trait]
impl TransitionHandler for ReactionDispatcher {
    async fn on_transition(&self, event: TransitionEvent) -> ContinueSignal {
        self.handle(event).await
    }
}

/// Reports transitions without buying anything.
#[derive(Debug, Default)]
pub struct MonitorOnlyCheckout;

#[async_trait]
impl CheckoutProcedure for MonitorOnlyCheckout {
    fn name(&self) -> &str {
        "monitor-only"
    }

    async fn checkout(&self, _target_id: &str) -> Result<CheckoutOutcome> {
        Ok(CheckoutOutcome::skipped("monitor-only mode"))
    }
}
