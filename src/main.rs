use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use restock_watcher::browser::{ChromeSession, ScriptedCheckout};
use restock_watcher::models::{InitialAvailability, Target};
use restock_watcher::plugins::{CheckoutProcedure, PluginManager};
use restock_watcher::utils::logging::init_logging;
use restock_watcher::{
    AppConfig, MonitorOnlyCheckout, ReactionDispatcher, StockWatcher, WatchScheduler,
};

#[derive(Parser, Debug)]
#[command(
    name = "restock-watcher",
    version,
    about = "Watch product pages for restocks and hand the checkout to you"
)]
struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Target ids to watch (all configured targets when omitted)
    #[arg(short, long = "target", global = true)]
    targets: Vec<String>,

    /// Report transitions without running the checkout
    #[arg(long, global = true)]
    monitor_only: bool,

    /// Stop watching a target after its first failed checkout
    #[arg(long, global = true)]
    stop_on_failure: bool,

    /// How a target that is already in stock at startup is treated
    #[arg(long, value_enum, global = true)]
    initial: Option<InitialArg>,

    /// Open the store's account page and wait for you to log in before watching
    #[arg(long, global = true)]
    login: bool,

    /// Chrome profile directory, so the login survives restarts
    #[arg(long, global = true)]
    user_data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the selected targets until they all stop or Ctrl-C
    Run,
    /// Print the configured targets
    List,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum InitialArg {
    Report,
    Trigger,
}

impl From<InitialArg> for InitialAvailability {
    fn from(arg: InitialArg) -> Self {
        match arg {
            InitialArg::Report => InitialAvailability::Report,
            InitialArg::Trigger => InitialAvailability::Trigger,
        }
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if cli.monitor_only {
        config.dispatcher.auto_checkout = false;
    }
    if cli.stop_on_failure {
        config.dispatcher.stop_on_failure = true;
    }
    if let Some(initial) = cli.initial {
        config.watcher.initial_availability = initial.into();
    }
    if cli.login {
        config.checkout.login_before_run = true;
        config.browser.headless = false;
    }
    if let Some(dir) = &cli.user_data_dir {
        config.browser.user_data_dir = Some(dir.to_string_lossy().into_owned());
    }
}

async fn wait_for_login(session: &ChromeSession, login_url: &str) -> Result<()> {
    session
        .open_page(login_url)
        .await
        .context("Failed to open the login page")?;

    println!("Log in to your store account in the browser window (solve any captcha),");
    println!("keep that window open, then press ENTER here to start watching...");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await?
    .context("Failed to read confirmation from stdin")?;

    info!("Login confirmed");
    Ok(())
}

fn selected_targets(config: &AppConfig, ids: &[String]) -> Vec<Target> {
    if ids.is_empty() {
        config.targets.clone()
    } else {
        ids.iter().map(|id| config.target(id)).collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        Command::Run => run(config, &cli.targets).await,
        Command::List => {
            for target in selected_targets(&config, &cli.targets) {
                println!(
                    "{:<8} {:<13} {:<40} {}",
                    target.id,
                    target.classifier.as_str(),
                    target.display_name(),
                    target.url
                );
            }
            Ok(())
        }
        Command::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run(config: AppConfig, ids: &[String]) -> Result<()> {
    let targets = selected_targets(&config, ids);
    if targets.is_empty() {
        bail!("No targets to watch; add [[targets]] to the configuration or pass --target");
    }

    info!("Starting Restock Watcher with {} target(s)...", targets.len());

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on port {}", config.metrics.port);
    }

    let plugins = PluginManager::new();
    plugins
        .initialize_default_plugins(&config.classifiers, &config.notifications)
        .await?;

    let browser_config = config.browser.clone();
    let session = Arc::new(tokio::task::spawn_blocking(move || ChromeSession::launch(browser_config)).await??);
    if config.dispatcher.auto_checkout
        && config.browser.user_data_dir.is_none()
        && !config.checkout.login_before_run
    {
        warn!("Checkout will run logged out: set browser.user_data_dir or pass --login");
    }
    if config.checkout.login_before_run {
        wait_for_login(&session, &config.checkout.login_url).await?;
    }

    let checkout: Arc<dyn CheckoutProcedure> = if config.dispatcher.auto_checkout {
        Arc::new(ScriptedCheckout::new(session.browser(), &targets, &config.checkout))
    } else {
        info!("Monitor-only mode: transitions will not be checked out");
        Arc::new(MonitorOnlyCheckout)
    };

    let dispatcher = Arc::new(ReactionDispatcher::new(checkout, plugins.clone(), &config.dispatcher));
    let watcher = StockWatcher::new(session, config.watcher.clone());
    let scheduler = WatchScheduler::new(watcher, dispatcher, plugins.clone());

    for target in targets {
        let classifier = plugins.classifier_for(target.classifier).await?;
        scheduler.schedule(target, classifier).await?;
    }

    let finished = tokio::select! {
        summary = scheduler.wait() => Some(summary),
        _ = tokio::signal::ctrl_c() => None,
    };
    let summary = match finished {
        Some(summary) => summary,
        None => {
            info!("Shutting down...");
            scheduler.shutdown().await
        }
    };

    let stats = scheduler.get_stats().await;
    info!(
        polls = stats.total_polls,
        transitions = stats.total_transitions,
        checkouts = stats.total_checkouts,
        "Finished after {}s",
        stats.uptime_seconds
    );
    for failure in &summary.failed {
        warn!(target_id = %failure.target_id, "Target failed: {}", failure.error);
    }

    plugins.shutdown().await?;

    if summary.all_failed() {
        bail!("Every target stopped on a fatal error");
    }
    Ok(())
}
