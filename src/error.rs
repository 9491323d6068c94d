use thiserror::Error;

/// Main error type for the decision subsystem
#[derive(Error, Debug)]
pub enum TacticianError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Model not allowed: {model} (allowed: {allowed})")]
    ModelNotAllowed { model: String, allowed: String },

    // Admission errors
    #[error("Admission timed out after {waited_ms}ms")]
    AdmissionTimeout { waited_ms: u64 },

    #[error("Admission gate closed")]
    GateClosed,

    // External decision service errors
    #[error("External call failed: {0}")]
    ExternalCall(String),

    #[error("External call timed out after {elapsed_ms}ms")]
    ExternalCallTimeout { elapsed_ms: u64 },

    #[error("Invalid decision response: {0}")]
    InvalidResponse(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TacticianError {
    /// Errors that come from the external decision call and degrade to a fallback
    pub fn is_call_failure(&self) -> bool {
        matches!(
            self,
            TacticianError::ExternalCall(_)
                | TacticianError::ExternalCallTimeout { .. }
                | TacticianError::InvalidResponse(_)
                | TacticianError::Http(_)
                | TacticianError::Json(_)
        )
    }

    /// Errors that must stop the process before it serves any request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TacticianError::Config(_)
                | TacticianError::Configuration(_)
                | TacticianError::ModelNotAllowed { .. }
        )
    }
}

/// Result type alias for TacticianError
pub type Result<T> = std::result::Result<T, TacticianError>;
