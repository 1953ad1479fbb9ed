use thiserror::Error;

/// WebDriver error codes that mean the page re-rendered underneath us.
const STALE_ERROR_CODES: [&str; 2] = ["stale element reference", "no such element"];

/// Main error type for the odds feed
#[derive(Error, Debug)]
pub enum OddsError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error [{code}]: {message}")]
    WebDriver { code: String, message: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Extraction errors
    #[error("Setup failed for event {event_id}: {reason}")]
    SetupFailure { event_id: String, reason: String },

    #[error("Page re-rendered during extraction: {0}")]
    TransientRender(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid odds: {0}")]
    Parse(String),

    // Query errors
    #[error("Invalid request: {0}")]
    ClientInput(String),

    #[error("No odds available yet for {0}")]
    NotYetAvailable(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl OddsError {
    /// True when the failure came from a detached or vanished page element.
    pub fn is_stale(&self) -> bool {
        match self {
            OddsError::TransientRender(_) => true,
            OddsError::WebDriver { code, .. } => STALE_ERROR_CODES.contains(&code.as_str()),
            _ => false,
        }
    }

    /// Failures the extraction loop absorbs by skipping a cycle.
    pub fn is_recoverable(&self) -> bool {
        self.is_stale() || matches!(self, OddsError::NotFound(_) | OddsError::Parse(_))
    }
}

/// Result type alias for OddsError
pub type Result<T> = std::result::Result<T, OddsError>;
