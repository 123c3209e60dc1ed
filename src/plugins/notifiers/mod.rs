// Notification sink implementations
pub mod discord;
pub mod email;
pub mod log;

pub use discord::{DiscordConfig, DiscordNotifier};
pub use email::{EmailConfig, EmailNotifier};
pub use log::LogNotifier;
