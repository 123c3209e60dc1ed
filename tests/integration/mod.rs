// Shared fixtures for the integration tests: scripted pages, a stub checkout and a
// recording sink, wired into the real classifiers and plugin manager.

pub mod dispatcher_tests;
pub mod scheduler_tests;
pub mod watcher_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use restock_watcher::config::{ClassifiersConfig, DispatcherConfig, NotificationsConfig, WatcherConfig};
use restock_watcher::models::{CheckoutOutcome, ClassifierKind, ContinueSignal, Target, TransitionEvent};
use restock_watcher::plugins::traits::{
    Notification, NotificationResult, NotificationSink, RenderState,
};
use restock_watcher::plugins::{CheckoutProcedure, Classifier, PluginManager, RenderStateReader};
use restock_watcher::utils::error::{AppError, Result};
use restock_watcher::{ReactionDispatcher, StockWatcher, TransitionHandler};

pub const POLL_MS: u64 = 100;

/// One scripted read.
#[derive(Debug, Clone)]
pub enum Page {
    Html(String),
    Unreadable,
    Crashed,
}

pub fn product_in() -> Page {
    Page::Html(r#"<div class="index_usBtn__a1 index_red__b2">ADD TO BAG</div>"#.to_string())
}

pub fn product_out() -> Page {
    Page::Html(r#"<div class="index_usBtn__a1 index_black__c3">ADD TO BAG</div>"#.to_string())
}

pub fn set_open() -> Page {
    Page::Html("<button class=\"ant-btn\">BUY MULTIPLE BOXES</button>".to_string())
}

pub fn set_closed() -> Page {
    Page::Html("<button class=\"ant-btn\">NOTIFY ME WHEN START</button>".to_string())
}

/// Serves a fixed sequence of pages per target.
///
/// Once a target's script runs dry the last page repeats, unless a stop token was
/// given, in which case the token is cancelled instead.
#[derive(Default)]
pub struct FixtureReader {
    scripts: Mutex<HashMap<String, VecDeque<Page>>>,
    last: Mutex<HashMap<String, Page>>,
    reads: Mutex<HashMap<String, u64>>,
    attached: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
    stop_when_done: Option<CancellationToken>,
}

impl FixtureReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stopping(token: CancellationToken) -> Self {
        Self {
            stop_when_done: Some(token),
            ..Self::default()
        }
    }

    pub fn script(self, target_id: &str, pages: Vec<Page>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(target_id.to_string(), pages.into());
        self
    }

    pub fn reads(&self, target_id: &str) -> u64 {
        self.reads.lock().unwrap().get(target_id).copied().unwrap_or(0)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.lock().unwrap().clone()
    }

    fn next_page(&self, target_id: &str) -> Option<Page> {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(target_id)
            .and_then(|pages| pages.pop_front());

        match next {
            Some(page) => {
                self.last.lock().unwrap().insert(target_id.to_string(), page.clone());
                Some(page)
            }
            None if self.stop_when_done.is_some() => None,
            None => self.last.lock().unwrap().get(target_id).cloned(),
        }
    }
}

#[async_trait]
impl RenderStateReader for FixtureReader {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn attach(&self, target: &Target) -> Result<()> {
        self.attached.lock().unwrap().push(target.id.clone());
        Ok(())
    }

    async fn read(&self, target: &Target) -> Result<RenderState> {
        *self.reads.lock().unwrap().entry(target.id.clone()).or_insert(0) += 1;

        match self.next_page(&target.id) {
            Some(Page::Html(html)) => Ok(RenderState::new(&target.id, &target.url, html)),
            Some(Page::Unreadable) => Err(AppError::render_unavailable(&target.id, "page still loading")),
            Some(Page::Crashed) => Err(AppError::fatal_resource(&target.id, "tab crashed")),
            None => {
                if let Some(token) = &self.stop_when_done {
                    token.cancel();
                }
                std::future::pending().await
            }
        }
    }

    async fn release(&self, target: &Target) -> Result<()> {
        self.released.lock().unwrap().push(target.id.clone());
        Ok(())
    }
}

/// One checkout attempt as seen by [`StubCheckout`].
#[derive(Debug, Clone)]
pub struct CheckoutCall {
    pub target_id: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Checkout double with per-target outcomes and delays.
pub struct StubCheckout {
    outcomes: Mutex<HashMap<String, VecDeque<CheckoutOutcome>>>,
    delays: HashMap<String, Duration>,
    fallback: CheckoutOutcome,
    calls: Mutex<Vec<CheckoutCall>>,
}

impl StubCheckout {
    pub fn always(outcome: CheckoutOutcome) -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            fallback: outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, target_id: &str, outcome: CheckoutOutcome) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .entry(target_id.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn slow(mut self, target_id: &str, delay: Duration) -> Self {
        self.delays.insert(target_id.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<CheckoutCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, target_id: &str) -> Vec<CheckoutCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.target_id == target_id)
            .collect()
    }
}

#[async_trait]
impl CheckoutProcedure for StubCheckout {
    fn name(&self) -> &str {
        "stub"
    }

    async fn checkout(&self, target_id: &str) -> Result<CheckoutOutcome> {
        let started = Instant::now();
        if let Some(delay) = self.delays.get(target_id) {
            tokio::time::sleep(*delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(target_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        self.calls.lock().unwrap().push(CheckoutCall {
            target_id: target_id.to_string(),
            started,
            finished: Instant::now(),
        });
        Ok(outcome)
    }
}

/// Keeps every notification it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "Recording"
    }

    fn sink_type(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(NotificationResult {
            success: true,
            message_id: None,
            error: None,
        })
    }
}

/// Records the poll at which each transition fired and always answers with `signal`.
pub struct RecordingHandler {
    signal: ContinueSignal,
    polls: Mutex<Vec<u64>>,
}

impl RecordingHandler {
    pub fn new(signal: ContinueSignal) -> Self {
        Self {
            signal,
            polls: Mutex::new(Vec::new()),
        }
    }

    pub fn polls(&self) -> Vec<u64> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransitionHandler for RecordingHandler {
    async fn on_transition(&self, event: TransitionEvent) -> ContinueSignal {
        self.polls.lock().unwrap().push(event.status.poll_count);
        self.signal
    }
}

pub fn product(id: &str) -> Target {
    Target::new(
        id,
        format!("Product {}", id),
        format!("https://www.popmart.com/ca/products/{}/", id),
        ClassifierKind::ClassToggle,
    )
}

pub fn drop_set(id: &str) -> Target {
    Target::new(
        id,
        format!("Set {}", id),
        format!("https://www.popmart.com/ca/pop-now/set/{}", id),
        ClassifierKind::LabelToggle,
    )
}

pub fn watcher_config() -> WatcherConfig {
    WatcherConfig {
        poll_interval_ms: POLL_MS,
        ..WatcherConfig::default()
    }
}

/// Plugin manager with both stock classifiers and the log sink.
pub async fn default_plugins() -> PluginManager {
    let plugins = PluginManager::new();
    plugins
        .initialize_default_plugins(&ClassifiersConfig::default(), &NotificationsConfig::default())
        .await
        .unwrap();
    plugins
}

pub async fn classifier(plugins: &PluginManager, target: &Target) -> Arc<dyn Classifier> {
    plugins.classifier_for(target.classifier).await.unwrap()
}

pub fn watcher(reader: Arc<FixtureReader>, config: WatcherConfig) -> StockWatcher {
    StockWatcher::new(reader, config)
}

pub fn dispatcher(
    checkout: Arc<StubCheckout>,
    plugins: PluginManager,
    stop_on_failure: bool,
) -> Arc<ReactionDispatcher> {
    Arc::new(ReactionDispatcher::new(
        checkout,
        plugins,
        &DispatcherConfig {
            auto_checkout: true,
            stop_on_failure,
        },
    ))
}
