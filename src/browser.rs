use anyhow::{anyhow, bail};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, CheckoutConfig};
use crate::models::{CheckoutOutcome, CheckoutStep, Target};
use crate::plugins::traits::{CheckoutProcedure, RenderState, RenderStateReader};
use crate::utils::error::{AppError, Result};

/// Error texts headless_chrome produces once the browser or tab is gone for good.
const CONNECTION_LOST: &[&str] = &[
    "connection is closed",
    "connection closed",
    "no such target",
    "target closed",
];

fn is_connection_lost(err: &anyhow::Error) -> bool {
    let message = format!("{:#}", err).to_lowercase();
    CONNECTION_LOST.iter().any(|needle| message.contains(needle))
}

/// Chrome launch options for `config`. A `user_data_dir` keeps the store login between runs.
pub fn launch_options(config: &BrowserConfig) -> anyhow::Result<LaunchOptions<'static>> {
    LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(false) // Often needed in containerized environments
        .window_size(Some((config.window_width, config.window_height)))
        .path(config.chrome_path.as_ref().map(PathBuf::from))
        .user_data_dir(config.user_data_dir.as_ref().map(PathBuf::from))
        .idle_browser_timeout(Duration::from_secs(24 * 60 * 60))
        .args(vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--disable-background-timer-throttling"),
            OsStr::new("--disable-backgrounding-occluded-windows"),
            OsStr::new("--disable-renderer-backgrounding"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
        ])
        .build()
        .map_err(|e| anyhow!("Failed to create launch options: {}", e))
}

pub fn launch_browser(config: &BrowserConfig) -> anyhow::Result<Browser> {
    Browser::new(launch_options(config)?).map_err(|e| anyhow!("Failed to launch browser: {}", e))
}

/// Read bookkeeping for one tab.
#[derive(Debug, Default)]
struct ReadHealth {
    failures: AtomicU32,
    in_flight: AtomicBool,
}

impl ReadHealth {
    /// Claims the tab for one read. False while an earlier read is still stuck in Chrome.
    fn begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    fn succeeded(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Counts a failed read and returns true when the tab is due for a reload.
    fn failed(&self, reload_after: u32) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        reload_after > 0 && failures % reload_after == 0
    }

    fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Releases the read claim when the blocking worker returns, panics included.
struct InFlight<'a>(&'a ReadHealth);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

struct TabSlot {
    tab: Arc<Tab>,
    health: ReadHealth,
}

/// Render-state reader backed by one Chrome tab per target.
pub struct ChromeSession {
    browser: Browser,
    config: BrowserConfig,
    tabs: RwLock<HashMap<String, Arc<TabSlot>>>,
}

impl ChromeSession {
    pub fn launch(config: BrowserConfig) -> anyhow::Result<Self> {
        let browser = launch_browser(&config)?;
        info!(headless = config.headless, "Chrome session started");
        Ok(Self {
            browser,
            config,
            tabs: RwLock::new(HashMap::new()),
        })
    }

    pub fn browser(&self) -> Browser {
        self.browser.clone()
    }

    async fn slot(&self, target: &Target) -> Result<Arc<TabSlot>> {
        let tabs = self.tabs.read().await;
        tabs.get(&target.id)
            .cloned()
            .ok_or_else(|| AppError::fatal_resource(&target.id, "no tab attached"))
    }

    async fn navigate(&self, target: &Target, tab: Arc<Tab>) -> Result<()> {
        let strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms.max(1))
            .map(jitter)
            .take(self.config.retry_attempts);
        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        let read_timeout = self.config.read_timeout();

        Retry::spawn(strategy, || {
            let tab = Arc::clone(&tab);
            let url = target.url.clone();
            let target_url = target.url.clone();
            let target_id = target.id.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                    tab.set_default_timeout(timeout);
                    tab.navigate_to(&url)?;
                    tab.wait_until_navigated()?;
                    // Bounds every later get_content call on this tab.
                    tab.set_default_timeout(read_timeout);
                    Ok(())
                })
                .await
                .map_err(|e| AppError::Internal(format!("navigation worker failed: {}", e)))?;

                result.map_err(|e| {
                    warn!(target_id = %target_id, "Navigation failed: {}", e);
                    AppError::Browser(format!("navigation to {} failed: {}", target_url, e))
                })
            }
        })
        .await
    }

    /// Counts a failed read, reloads the tab every `reload_after_failures` of them and
    /// reports the poll as unavailable.
    async fn read_failed(&self, target: &Target, slot: &TabSlot, reason: String) -> Result<RenderState> {
        if slot.health.failed(self.config.reload_after_failures) {
            warn!(
                target_id = %target.id,
                failures = slot.health.failures(),
                "Reloading page after repeated read failures"
            );
            let tab = Arc::clone(&slot.tab);
            let reloaded = tokio::task::spawn_blocking(move || tab.reload(false, None).map(|_| ()))
                .await
                .map_err(|e| AppError::Internal(format!("reload worker failed: {}", e)))?;
            if let Err(e) = reloaded {
                if is_connection_lost(&e) {
                    return Err(AppError::fatal_resource(&target.id, e.to_string()));
                }
                warn!(target_id = %target.id, "Reload failed: {}", e);
            }
        }

        Err(AppError::render_unavailable(&target.id, reason))
    }

    /// Opens `url` in a tab of its own and leaves it open, e.g. for the operator to log in.
    pub async fn open_page(&self, url: &str) -> Result<()> {
        let browser = self.browser.clone();
        let url = url.to_string();
        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("page worker failed: {}", e)))?
        .map_err(|e| AppError::Browser(format!("failed to open page: {}", e)))
    }
}

#[async_trait]
impl RenderStateReader for ChromeSession {
    fn name(&self) -> &str {
        "chrome"
    }

    async fn attach(&self, target: &Target) -> Result<()> {
        let browser = self.browser.clone();
        let user_agent = self.config.user_agent.clone();

        let tab = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            tab.set_user_agent(&user_agent, None, None)?;
            Ok(tab)
        })
        .await
        .map_err(|e| AppError::Internal(format!("tab worker failed: {}", e)))?
        .map_err(|e| AppError::fatal_resource(&target.id, format!("failed to open tab: {}", e)))?;

        if let Err(e) = self.navigate(target, Arc::clone(&tab)).await {
            let _ = tab.close(true);
            return Err(AppError::fatal_resource(&target.id, e.to_string()));
        }

        let mut tabs = self.tabs.write().await;
        tabs.insert(
            target.id.clone(),
            Arc::new(TabSlot {
                tab,
                health: ReadHealth::default(),
            }),
        );
        debug!(target_id = %target.id, "Tab attached");
        Ok(())
    }

    async fn read(&self, target: &Target) -> Result<RenderState> {
        let slot = self.slot(target).await?;
        if !slot.health.begin() {
            return self
                .read_failed(target, &slot, "previous read still pending".to_string())
                .await;
        }

        let worker = Arc::clone(&slot);
        let handle = tokio::task::spawn_blocking(move || {
            let _in_flight = InFlight(&worker.health);
            let html = worker.tab.get_content()?;
            Ok::<_, anyhow::Error>((worker.tab.get_url(), html))
        });

        let read_timeout = self.config.read_timeout();
        let content = match tokio::time::timeout(read_timeout, handle).await {
            Ok(joined) => joined.map_err(|e| AppError::Internal(format!("read worker failed: {}", e)))?,
            Err(_) => {
                let reason = format!("read timed out after {}ms", read_timeout.as_millis());
                return self.read_failed(target, &slot, reason).await;
            }
        };

        match content {
            Ok((url, html)) => {
                slot.health.succeeded();
                Ok(RenderState::new(&target.id, url, html))
            }
            Err(e) if is_connection_lost(&e) => Err(AppError::fatal_resource(&target.id, e.to_string())),
            Err(e) => self.read_failed(target, &slot, e.to_string()).await,
        }
    }

    async fn release(&self, target: &Target) -> Result<()> {
        let slot = self.tabs.write().await.remove(&target.id);
        if let Some(slot) = slot {
            tokio::task::spawn_blocking(move || slot.tab.close(true))
                .await
                .map_err(|e| AppError::Internal(format!("close worker failed: {}", e)))?
                .map_err(|e| AppError::Browser(format!("failed to close tab: {}", e)))?;
            debug!(target_id = %target.id, "Tab released");
        }
        Ok(())
    }
}

/// Steps for `target`: its own script when it has one, the global one otherwise.
pub fn resolve_steps<'a>(target: Option<&'a Target>, default_steps: &'a [CheckoutStep]) -> &'a [CheckoutStep] {
    target
        .and_then(|t| t.checkout_steps.as_deref())
        .unwrap_or(default_steps)
}

/// JS that clicks the first visible, enabled control whose text contains `text`. Evaluates to a bool.
pub fn click_text_script(text: &str) -> String {
    let label = serde_json::Value::String(text.to_uppercase()).to_string();
    format!(
        r#"(function(wanted) {{
    const candidates = document.querySelectorAll('button, [role="button"], div[class*="Btn"], div[class*="btn"]');
    for (const el of candidates) {{
        if (el.offsetParent !== null && !el.disabled && el.textContent.toUpperCase().includes(wanted)) {{
            el.click();
            return true;
        }}
    }}
    return false;
}})({})"#,
        label
    )
}

fn run_step(tab: &Tab, step: &CheckoutStep, timeout: Duration) -> anyhow::Result<()> {
    match step {
        CheckoutStep::Navigate { url } => {
            tab.navigate_to(url)?;
            tab.wait_until_navigated()?;
        }
        CheckoutStep::Click { selector, .. } => {
            tab.wait_for_element_with_custom_timeout(selector, timeout)?
                .click()?;
        }
        CheckoutStep::ClickText { text, .. } => {
            let script = click_text_script(text);
            let started = Instant::now();
            loop {
                let clicked = tab
                    .evaluate(&script, false)?
                    .value
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if clicked {
                    break;
                }
                if started.elapsed() >= timeout {
                    bail!("no clickable element with text '{}'", text);
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        CheckoutStep::WaitFor { selector } => {
            tab.wait_for_element_with_custom_timeout(selector, timeout)?;
        }
        CheckoutStep::Pause { millis } => std::thread::sleep(Duration::from_millis(*millis)),
    }
    Ok(())
}

fn run_script(browser: Browser, url: String, steps: Vec<CheckoutStep>, timeout: Duration) -> anyhow::Result<()> {
    let tab = browser.new_tab()?;
    tab.set_default_timeout(timeout);
    tab.navigate_to(&url)?;
    tab.wait_until_navigated()?;

    for (index, step) in steps.iter().enumerate() {
        match run_step(&tab, step, timeout) {
            Ok(()) => debug!("Checkout step {} ok: {}", index + 1, step),
            Err(e) if step.is_optional() => {
                debug!("Optional checkout step {} skipped ({}): {}", index + 1, step, e)
            }
            Err(e) => {
                let _ = tab.close(true);
                bail!("step {} ({}) failed: {}", index + 1, step, e);
            }
        }
    }

    // The tab stays open on the payment page for the operator.
    Ok(())
}

/// Clicks through the configured purchase flow in a fresh tab.
pub struct ScriptedCheckout {
    browser: Browser,
    targets: HashMap<String, Target>,
    default_steps: Vec<CheckoutStep>,
    step_timeout: Duration,
}

impl ScriptedCheckout {
    pub fn new(browser: Browser, targets: &[Target], config: &CheckoutConfig) -> Self {
        Self {
            browser,
            targets: targets.iter().map(|t| (t.id.clone(), t.clone())).collect(),
            default_steps: config.steps.clone(),
            step_timeout: config.step_timeout(),
        }
    }
}

#[async_trait]
impl CheckoutProcedure for ScriptedCheckout {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn checkout(&self, target_id: &str) -> Result<CheckoutOutcome> {
        let target = self
            .targets
            .get(target_id)
            .ok_or_else(|| AppError::checkout(target_id, "target not registered for checkout"))?;

        let steps = resolve_steps(Some(target), &self.default_steps).to_vec();
        if steps.is_empty() {
            return Ok(CheckoutOutcome::skipped("no checkout steps configured"));
        }

        info!(target_id, steps = steps.len(), "Starting checkout");
        let browser = self.browser.clone();
        let url = target.url.clone();
        let timeout = self.step_timeout;

        let result = tokio::task::spawn_blocking(move || run_script(browser, url, steps, timeout))
            .await
            .map_err(|e| AppError::checkout(target_id, format!("checkout worker failed: {}", e)))?;

        match result {
            Ok(()) => {
                info!(target_id, "Checkout reached payment; finish it manually");
                Ok(CheckoutOutcome::Success)
            }
            Err(e) => Ok(CheckoutOutcome::failure(e.to_string())),
        }
    }
}
