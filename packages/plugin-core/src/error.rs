use thiserror::Error;

/// Errors surfaced by plugin variants from their lifecycle hooks,
/// `execute`, and chat-intent handlers.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The variant's unit of work failed (outbound I/O, missing data, etc.).
    #[error("Execution failed: {0}")]
    Execution(String),

    /// A chat intent action the variant does not recognize.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PluginError {
    pub fn execution(detail: impl Into<String>) -> Self {
        PluginError::Execution(detail.into())
    }
}
