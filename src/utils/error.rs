use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    /// The target's page could not be read for this poll.
    #[error("Render state unavailable for {target_id}: {message}")]
    RenderUnavailable { target_id: String, message: String },

    #[error("Classification failed for {target_id}: {message}")]
    Classification { target_id: String, message: String },

    #[error("Checkout failed for {target_id}: {message}")]
    Checkout { target_id: String, message: String },

    /// The render-state resource is gone for good (closed tab, dead browser).
    #[error("Fatal resource failure for {target_id}: {message}")]
    FatalResource { target_id: String, message: String },

    #[error("Notification error: {sink}: {message}")]
    Notification { sink: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn render_unavailable(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::RenderUnavailable {
            target_id: target_id.into(),
            message: message.into(),
        }
    }

    pub fn classification(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Classification {
            target_id: target_id.into(),
            message: message.into(),
        }
    }

    pub fn checkout(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Checkout {
            target_id: target_id.into(),
            message: message.into(),
        }
    }

    pub fn fatal_resource(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::FatalResource {
            target_id: target_id.into(),
            message: message.into(),
        }
    }

    /// Only fatal resource failures end a watch loop; everything else is retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::FatalResource { .. })
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
