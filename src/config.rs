use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::models::{CheckoutStep, InitialAvailability, StorefrontUrls, Target};
use crate::plugins::classifiers::{ClassToggleConfig, LabelToggleConfig};
use crate::plugins::notifiers::{DiscordConfig, EmailConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watcher: WatcherConfig,
    pub dispatcher: DispatcherConfig,
    pub browser: BrowserConfig,
    pub checkout: CheckoutConfig,
    pub classifiers: ClassifiersConfig,
    pub storefront: StorefrontUrls,
    pub targets: Vec<Target>,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_ms: u64,
    pub classify_timeout_ms: u64,
    /// Warn on every n-th consecutive failed poll; the rest go to debug.
    pub failure_log_every: u64,
    pub status_log_interval_secs: u64,
    pub initial_availability: InitialAvailability,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            classify_timeout_ms: 2000,
            failure_log_every: 20,
            status_log_interval_secs: 2,
            initial_availability: InitialAvailability::Report,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn status_log_interval(&self) -> Duration {
        Duration::from_secs(self.status_log_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// When false, transitions are only reported and never checked out.
    pub auto_checkout: bool,
    pub stop_on_failure: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auto_checkout: true,
            stop_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_secs: u64,
    /// Limit for one page read. Kept below `watcher.classify_timeout_ms` so the reader
    /// gives up on a hung tab first and counts it toward a reload.
    pub read_timeout_ms: u64,
    /// Chrome profile directory. Keeps the store login across runs; a fresh temporary
    /// profile is used when unset.
    pub user_data_dir: Option<String>,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    /// Reload a target's tab after this many consecutive failed reads. 0 disables reloads.
    pub reload_after_failures: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
            read_timeout_ms: 1500,
            user_data_dir: None,
            retry_attempts: 3,
            retry_delay_ms: 500,
            reload_after_failures: 40,
        }
    }
}

impl BrowserConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Open `login_url` and wait for the operator to log in before watching starts.
    pub login_before_run: bool,
    pub login_url: String,
    pub step_timeout_secs: u64,
    /// Used for every target without its own `checkout_steps`.
    pub steps: Vec<CheckoutStep>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            login_before_run: false,
            login_url: "https://www.popmart.com/ca/account".to_string(),
            step_timeout_secs: 10,
            steps: vec![
                CheckoutStep::ClickText {
                    text: "Buy Multiple Boxes".to_string(),
                    optional: true,
                },
                CheckoutStep::Pause { millis: 30 },
                CheckoutStep::ClickText {
                    text: "ADD TO BAG".to_string(),
                    optional: false,
                },
                CheckoutStep::Pause { millis: 200 },
                CheckoutStep::Navigate {
                    url: "https://www.popmart.com/ca/largeShoppingCart".to_string(),
                },
                CheckoutStep::Pause { millis: 3000 },
                CheckoutStep::Click {
                    selector: ".ant-checkbox-wrapper".to_string(),
                    optional: true,
                },
                CheckoutStep::ClickText {
                    text: "CHECK OUT".to_string(),
                    optional: false,
                },
            ],
        }
    }
}

impl CheckoutConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifiersConfig {
    pub class_toggle: ClassToggleConfig,
    pub label_toggle: LabelToggleConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub discord: Option<DiscordConfig>,
    pub smtp: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the daily rolling log file. Console only when unset.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "restock-watcher.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl AppConfig {
    /// Layers `config/default`, `config/{RUN_MODE}`, `config/local`, the explicit file and
    /// `RESTOCK_*` environment variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            // e.g. RESTOCK_WATCHER__POLL_INTERVAL_MS=150
            .add_source(
                Environment::with_prefix("RESTOCK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watcher.poll_interval_ms == 0 || self.watcher.poll_interval_ms >= 1000 {
            return Err(ConfigError::Message(
                "Watcher poll_interval_ms must be between 1 and 999".into(),
            ));
        }

        if self.watcher.classify_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Watcher classify_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.browser.read_timeout_ms == 0
            || self.browser.read_timeout_ms >= self.watcher.classify_timeout_ms
        {
            return Err(ConfigError::Message(
                "Browser read_timeout_ms must be between 1 and watcher classify_timeout_ms".into(),
            ));
        }

        if self.checkout.login_before_run {
            if self.browser.headless {
                return Err(ConfigError::Message(
                    "Checkout login_before_run needs a visible browser (browser.headless = false)".into(),
                ));
            }
            url::Url::parse(&self.checkout.login_url).map_err(|e| {
                ConfigError::Message(format!("Invalid checkout login_url: {}", e))
            })?;
        }

        if self.checkout.step_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Checkout step_timeout_secs must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            target
                .validate()
                .map_err(|e| ConfigError::Message(format!("Invalid target '{}': {}", target.id, e)))?;

            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate target id '{}'",
                    target.id
                )));
            }
        }

        if let Some(discord) = &self.notifications.discord {
            discord
                .validate()
                .map_err(|e| ConfigError::Message(format!("Discord notifications: {}", e)))?;
        }

        if let Some(smtp) = &self.notifications.smtp {
            smtp.validate()
                .map_err(|e| ConfigError::Message(format!("SMTP notifications: {}", e)))?;
        }

        if self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }

    /// Configured target with `id`, or one derived from the storefront URL layout.
    pub fn target(&self, id: &str) -> Target {
        self.targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .unwrap_or_else(|| Target::from_id(id, &self.storefront))
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
