use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{ContinueSignal, StockStatus, StopReason, Target, TransitionEvent, WatchReport, WatchState};
use crate::plugins::traits::{Classifier, Notification};
use crate::plugins::PluginManager;
use crate::utils::error::{AppError, Result};
use crate::watcher::{StockWatcher, TransitionHandler};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub target_id: String,
    pub status: WatchState,
    pub session_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub polls: u64,
    pub transitions: u64,
    pub checkouts: u64,
    pub last_status: Option<StockStatus>,
    pub stop_reason: Option<StopReason>,
    pub last_error: Option<String>,
}

impl JobInfo {
    fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            status: WatchState::Watching,
            session_id: None,
            started_at: Utc::now(),
            finished_at: None,
            polls: 0,
            transitions: 0,
            checkouts: 0,
            last_status: None,
            stop_reason: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_jobs: usize,
    pub watching_jobs: usize,
    pub reacting_jobs: usize,
    pub stopped_jobs: usize,
    pub failed_jobs: usize,
    pub total_polls: u64,
    pub total_transitions: u64,
    pub total_checkouts: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFailure {
    pub target_id: String,
    pub error: String,
}

/// How every scheduled watch ended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub completed: Vec<WatchReport>,
    pub failed: Vec<TargetFailure>,
}

impl MonitorSummary {
    /// True only when at least one target ran and every one of them failed.
    pub fn all_failed(&self) -> bool {
        self.completed.is_empty() && !self.failed.is_empty()
    }
}

type JobTable = Arc<RwLock<HashMap<String, JobInfo>>>;

/// Running watch tasks and the target each one belongs to.
#[derive(Default)]
struct WatchTasks {
    set: JoinSet<Result<WatchReport>>,
    targets: HashMap<task::Id, String>,
}

/// Mirrors a watch loop's progress into the job table before delegating.
struct TrackedHandler {
    target_id: String,
    inner: Arc<dyn TransitionHandler>,
    jobs: JobTable,
}

impl TrackedHandler {
    async fn update(&self, f: impl FnOnce(&mut JobInfo)) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&self.target_id) {
            f(job);
        }
    }
}

#[async_trait]
impl TransitionHandler for TrackedHandler {
    async fn on_transition(&self, event: TransitionEvent) -> ContinueSignal {
        self.update(|job| {
            job.status = WatchState::Reacting;
            job.transitions += 1;
        })
        .await;

        let signal = self.inner.on_transition(event).await;

        self.update(|job| {
            job.checkouts += 1;
            if signal.should_continue() {
                job.status = WatchState::Watching;
            }
        })
        .await;
        signal
    }

    async fn on_status(&self, status: &StockStatus) {
        self.update(|job| {
            job.polls = status.poll_count;
            job.last_status = Some(status.clone());
        })
        .await;
        self.inner.on_status(status).await;
    }
}

/// Runs one independent watch task per target.
pub struct WatchScheduler {
    watcher: StockWatcher,
    handler: Arc<dyn TransitionHandler>,
    plugins: PluginManager,
    jobs: JobTable,
    tasks: Mutex<WatchTasks>,
    cancel: CancellationToken,
    start_time: DateTime<Utc>,
}

impl WatchScheduler {
    pub fn new(
        watcher: StockWatcher,
        handler: Arc<dyn TransitionHandler>,
        plugins: PluginManager,
    ) -> Self {
        Self {
            watcher,
            handler,
            plugins,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tasks: Mutex::new(WatchTasks::default()),
            cancel: CancellationToken::new(),
            start_time: Utc::now(),
        }
    }

    /// Token that stops every watch loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start watching `target` in its own task.
    pub async fn schedule(&self, target: Target, classifier: Arc<dyn Classifier>) -> Result<()> {
        {
            let mut jobs = self.jobs.write().await;
            if jobs.get(&target.id).is_some_and(|job| job.status != WatchState::Stopped) {
                return Err(AppError::Validation(format!(
                    "Target {} is already being watched",
                    target.id
                )));
            }
            jobs.insert(target.id.clone(), JobInfo::new(&target.id));
        }

        let watcher = self.watcher.clone();
        let jobs = Arc::clone(&self.jobs);
        let plugins = self.plugins.clone();
        let cancel = self.cancel.clone();
        let tracked = TrackedHandler {
            target_id: target.id.clone(),
            inner: Arc::clone(&self.handler),
            jobs: Arc::clone(&self.jobs),
        };

        tracing::info!(
            "Scheduled target {} with {} classifier every {}ms",
            target.id,
            classifier.kind(),
            watcher.config().poll_interval_ms
        );

        let target_id = target.id.clone();
        let mut tasks = self.tasks();
        let handle = tasks.set.spawn(async move {
            metrics::gauge!("restock_active_targets").increment(1.0);
            let result = watcher
                .start_watch(&target, classifier.as_ref(), &tracked, &cancel)
                .await;
            metrics::gauge!("restock_active_targets").decrement(1.0);

            let reason = Self::finish_job(&jobs, &target.id, &result).await;
            plugins
                .broadcast(&Notification::TargetStopped {
                    target_id: target.id.clone(),
                    reason,
                })
                .await;

            result
        });
        tasks.targets.insert(handle.id(), target_id);

        Ok(())
    }

    /// The task table is only ever locked for one synchronous step, never across an await.
    fn tasks(&self) -> MutexGuard<'_, WatchTasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_target(&self, id: task::Id) -> String {
        self.tasks()
            .targets
            .remove(&id)
            .unwrap_or_else(|| "unknown".to_string())
    }

    async fn finish_job(jobs: &JobTable, target_id: &str, result: &Result<WatchReport>) -> StopReason {
        let reason = match result {
            Ok(report) => report.stop_reason.clone(),
            Err(e) => StopReason::Fatal {
                message: e.to_string(),
            },
        };

        let mut jobs = jobs.write().await;
        if let Some(job) = jobs.get_mut(target_id) {
            job.status = WatchState::Stopped;
            job.finished_at = Some(Utc::now());
            job.stop_reason = Some(reason.clone());
            match result {
                Ok(report) => {
                    job.session_id = Some(report.session_id);
                    job.polls = report.polls;
                    job.transitions = report.transitions;
                }
                Err(e) => job.last_error = Some(e.to_string()),
            }
        }
        reason
    }

    /// Get job information for a target
    pub async fn get_job_info(&self, target_id: &str) -> Option<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.get(target_id).cloned()
    }

    /// Get all scheduled jobs
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.values().cloned().collect()
    }

    /// Get scheduler statistics
    pub async fn get_stats(&self) -> SchedulerStats {
        let jobs = self.jobs.read().await;
        let count = |state: WatchState| jobs.values().filter(|j| j.status == state).count();

        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            total_jobs: jobs.len(),
            watching_jobs: count(WatchState::Watching),
            reacting_jobs: count(WatchState::Reacting),
            stopped_jobs: count(WatchState::Stopped),
            failed_jobs: jobs.values().filter(|j| j.last_error.is_some()).count(),
            total_polls: jobs.values().map(|j| j.polls).sum(),
            total_transitions: jobs.values().map(|j| j.transitions).sum(),
            total_checkouts: jobs.values().map(|j| j.checkouts).sum(),
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    /// Waits until every scheduled watch has ended, including ones scheduled while waiting.
    pub async fn wait(&self) -> MonitorSummary {
        let mut summary = MonitorSummary::default();

        while let Some(joined) = poll_fn(|cx| self.tasks().set.poll_join_next_with_id(cx)).await {
            match joined {
                Ok((id, Ok(report))) => {
                    self.take_target(id);
                    summary.completed.push(report);
                }
                Ok((id, Err(e))) => summary.failed.push(TargetFailure {
                    target_id: self.take_target(id),
                    error: e.to_string(),
                }),
                Err(e) => {
                    let target_id = self.take_target(e.id());
                    tracing::error!(target_id = %target_id, "Watch task panicked: {}", e);
                    let error = AppError::Internal(format!("watch task failed: {}", e));
                    Self::finish_job(&self.jobs, &target_id, &Err(error)).await;
                    summary.failed.push(TargetFailure {
                        target_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        summary
    }

    /// Cancels every watch loop and waits for them to release their resources.
    pub async fn shutdown(&self) -> MonitorSummary {
        tracing::info!("Stopping all watches");
        self.cancel.cancel();
        let summary = self.wait().await;
        tracing::info!(
            "Watch scheduler shutdown ({} completed, {} failed)",
            summary.completed.len(),
            summary.failed.len()
        );
        summary
    }
}
