pub mod browser;
pub mod config;
pub mod dispatcher;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use config::AppConfig;
pub use dispatcher::{MonitorOnlyCheckout, ReactionDispatcher};
pub use scheduler::{MonitorSummary, WatchScheduler};
pub use utils::error::AppError;
pub use watcher::{StockWatcher, TransitionHandler};

pub type Result<T> = std::result::Result<T, AppError>;
