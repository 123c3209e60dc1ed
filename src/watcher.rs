use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::models::{ContinueSignal, StockStatus, StopReason, Target, TransitionEvent, WatchReport, WatchSession};
use crate::plugins::traits::{Classifier, RenderStateReader};
use crate::utils::error::{AppError, Result};

/// Receives the events a watch loop produces.
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    /// Called once per unavailable -> available edge. The loop waits for the answer.
    async fn on_transition(&self, event: TransitionEvent) -> ContinueSignal;

    /// Called after every poll, failed polls included.
    async fn on_status(&self, _status: &StockStatus) {}
}

enum Observation {
    Classified(StockStatus),
    Failed(StockStatus, AppError),
}

impl Observation {
    fn into_status(self) -> StockStatus {
        match self {
            Observation::Classified(status) | Observation::Failed(status, _) => status,
        }
    }
}

/// Polls one target at a time through a shared render-state reader.
#[derive(Clone)]
pub struct StockWatcher {
    reader: Arc<dyn RenderStateReader>,
    config: WatcherConfig,
}

impl StockWatcher {
    pub fn new(reader: Arc<dyn RenderStateReader>, config: WatcherConfig) -> Self {
        Self { reader, config }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn reader_name(&self) -> &str {
        self.reader.name()
    }

    /// Reads and classifies `target` once.
    ///
    /// Transient failures come back as an unavailable status; only fatal resource
    /// failures are returned as `Err`.
    pub async fn classify(
        &self,
        target: &Target,
        classifier: &dyn Classifier,
        poll_count: u64,
    ) -> Result<StockStatus> {
        Ok(self.observe(target, classifier, poll_count).await?.into_status())
    }

    async fn observe(
        &self,
        target: &Target,
        classifier: &dyn Classifier,
        poll_count: u64,
    ) -> Result<Observation> {
        let timeout = self.config.classify_timeout();

        let state = match tokio::time::timeout(timeout, self.reader.read(target)).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => return Ok(Observation::Failed(StockStatus::failed(&e, poll_count), e)),
            Err(_) => {
                let e = AppError::render_unavailable(
                    &target.id,
                    format!("read timed out after {}ms", timeout.as_millis()),
                );
                return Ok(Observation::Failed(StockStatus::failed(&e, poll_count), e));
            }
        };

        match classifier.classify(&state) {
            Ok(classification) => Ok(Observation::Classified(StockStatus::from_classification(
                classification,
                poll_count,
            ))),
            Err(e) => {
                let e = AppError::classification(&target.id, e.to_string());
                Ok(Observation::Failed(StockStatus::failed(&e, poll_count), e))
            }
        }
    }

    /// Watches `target` until the handler asks to stop, `cancel` fires, or the reader
    /// fails fatally. The reader is attached before the first poll and released on every exit path.
    pub async fn start_watch(
        &self,
        target: &Target,
        classifier: &dyn Classifier,
        handler: &dyn TransitionHandler,
        cancel: &CancellationToken,
    ) -> Result<WatchReport> {
        let mut session = WatchSession::new(&target.id);
        info!(
            target_id = %target.id,
            session_id = %session.id,
            classifier = %classifier.kind(),
            "Watching {} ({})",
            target.display_name(),
            target.url
        );

        let result = match self.reader.attach(target).await {
            Ok(()) => self.run(target, classifier, handler, cancel, &mut session).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.reader.release(target).await {
            warn!(target_id = %target.id, "Failed to release reader: {}", e);
        }
        session.stop();

        match result {
            Ok(reason) => {
                info!(
                    target_id = %target.id,
                    polls = session.poll_count,
                    transitions = session.transitions,
                    "Watch ended: {}",
                    reason
                );
                Ok(session.report(reason))
            }
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    polls = session.poll_count,
                    "Watch aborted: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        target: &Target,
        classifier: &dyn Classifier,
        handler: &dyn TransitionHandler,
        cancel: &CancellationToken,
        session: &mut WatchSession,
    ) -> Result<StopReason> {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let status_every = self.config.status_log_interval();
        let mut last_status_log = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                _ = ticker.tick() => {}
            }

            let poll = session.next_poll();
            let observation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                observation = self.observe(target, classifier, poll) => observation?,
            };
            metrics::counter!("restock_polls_total", "target" => target.id.clone()).increment(1);

            let status = match observation {
                Observation::Classified(status) => {
                    let streak = session.clear_failures();
                    if streak > 0 {
                        info!(target_id = %target.id, "Recovered after {} failed polls", streak);
                    }
                    status
                }
                Observation::Failed(status, error) => {
                    let streak = session.record_failure();
                    metrics::counter!("restock_poll_failures_total", "target" => target.id.clone())
                        .increment(1);
                    if streak == 1 || streak % self.config.failure_log_every.max(1) == 0 {
                        warn!(target_id = %target.id, poll, streak, "Poll failed: {}", error);
                    } else {
                        debug!(target_id = %target.id, poll, streak, "Poll failed: {}", error);
                    }
                    status
                }
            };

            if poll == 1 {
                info!(
                    target_id = %target.id,
                    "Initial status: {} ({})",
                    status.label(),
                    status.raw_signal
                );
            }

            handler.on_status(&status).await;
            let event = session.record(status, self.config.initial_availability);

            if last_status_log.elapsed() >= status_every {
                if let Some(current) = &session.last_status {
                    info!(
                        target_id = %target.id,
                        polls = session.poll_count,
                        "Status: {} ({})",
                        current.label(),
                        current.raw_signal
                    );
                }
                last_status_log = Instant::now();
            }

            let Some(event) = event else { continue };

            metrics::counter!("restock_transitions_total", "target" => target.id.clone()).increment(1);
            info!(
                target_id = %target.id,
                event_id = %event.id,
                poll,
                "Restock detected: {}",
                event.status.raw_signal
            );

            session.begin_reaction();
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                signal = handler.on_transition(event) => signal,
            };

            if !signal.should_continue() {
                return Ok(StopReason::Handler);
            }

            session.resume();
            ticker.reset();
            debug!(target_id = %target.id, "Resumed watching");
        }
    }
}
