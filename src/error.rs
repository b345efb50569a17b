//! Companion error types

/// Companion error types
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("empty response from model")]
    EmptyResponse,

    // Request errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A span exporter could not be constructed. Only ever seen by the
    /// exporter selector, which moves on to the next candidate.
    #[error("exporter error: {0}")]
    Exporter(String),

    // Host resource sampling
    #[error("sampling error: {0}")]
    Sampling(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CompanionError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => CompanionError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => CompanionError::Http(err.to_string()),
        }
    }
}

/// Classification of a failure for metric labels and HTTP mapping.
///
/// The instrumentors label error counters with [`error_kind()`](Self::error_kind)
/// and the request counter with [`status_code()`](Self::status_code). Any
/// error type passed through an instrumentor must implement this.
pub trait ErrorClass {
    /// Stable, low-cardinality name of the failure (e.g. `"InvalidInput"`).
    fn error_kind(&self) -> &str;

    /// HTTP status the failure surfaces as. Default: 500.
    fn status_code(&self) -> u16 {
        500
    }
}

impl ErrorClass for CompanionError {
    fn error_kind(&self) -> &str {
        match self {
            CompanionError::Http(_) => "Http",
            CompanionError::Api { .. } => "Api",
            CompanionError::EmptyResponse => "EmptyResponse",
            CompanionError::InvalidInput(_) => "InvalidInput",
            CompanionError::Configuration(_) => "Configuration",
            CompanionError::Exporter(_) => "Exporter",
            CompanionError::Sampling(_) => "Sampling",
            CompanionError::Json(_) => "Json",
            CompanionError::Io(_) => "Io",
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            CompanionError::InvalidInput(_) => 400,
            _ => 500,
        }
    }
}

/// Result type alias for Companion operations
pub type Result<T> = std::result::Result<T, CompanionError>;
