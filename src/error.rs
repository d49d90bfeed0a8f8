//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing and stitching a page
#[derive(Error, Debug)]
pub enum Error {
    /// The capture agent refused or failed to capture the visible viewport.
    /// The payload is the agent's reason, verbatim.
    #[error("{0}")]
    CaptureFailed(String),

    /// Assembling or exporting the composite failed
    #[error("Stitching failed: {0}")]
    StitchFailed(String),

    /// A page-side primitive (measure, scroll, style) failed
    #[error("Page operation failed: {0}")]
    PageError(String),

    /// The capture agent's worker is gone or never replied
    #[error("Capture agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Failed to initialize a backend
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Filesystem error while writing an artifact or reading config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed wire message or config file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Text carried by the `error` event sent to the control surface.
    pub fn event_text(&self) -> String {
        self.to_string()
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
