use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("No active browser session")]
    NoActiveSession,

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Row extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("JavaScript execution timeout")]
    JavaScriptTimeout,

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Chrome error: {0}")]
    ChromeError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;

// headless_chrome reports everything through anyhow
impl From<anyhow::Error> for WatchError {
    fn from(err: anyhow::Error) -> Self {
        WatchError::AnyhowError(err.to_string())
    }
}

impl WatchError {
    pub fn from_any_error<E: std::fmt::Display>(err: E) -> Self {
        WatchError::ChromeError(err.to_string())
    }

    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WatchError::SessionUnavailable(_) | WatchError::NoActiveSession => "session",
            WatchError::NavigationFailed(_) => "navigation",
            WatchError::ExtractionFailed(_) => "extraction",
            WatchError::DeliveryFailed(_) => "delivery",
            WatchError::ConfigurationError(_) | WatchError::InvalidSelector(_) => "config",
            _ => "internal",
        }
    }
}
