use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ReviewScope
#[derive(Error, Debug)]
pub enum ScopeError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// A credential required by the requested operation is not available
    #[error("Missing credential: environment variable {env_var} is not set")]
    MissingCredential { env_var: String },

    /// Rejected user input (empty query, empty URL list, empty selection)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// External job reported a terminal failure
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// External job did not reach a terminal state within its attempt budget
    #[error("Job {job_id} timed out after {attempts} status checks")]
    PollTimeout { job_id: String, attempts: u32 },

    /// Analysis of a single place failed
    #[error("Analysis failed for {place}: {message}")]
    Enrichment { place: String, message: String },

    /// Brand-level analysis failed
    #[error("Aggregate analysis failed: {0}")]
    AggregateEnrichment(String),

    /// External service returned content that could not be parsed
    #[error("Malformed response from {context}: {message}")]
    MalformedResponse { context: String, message: String },

    /// Controller operation issued in a state that does not allow it
    #[error("Operation '{operation}' is not allowed in state {state}")]
    InvalidState { operation: String, state: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {context}: {source}")]
    Http {
        source: reqwest::Error,
        context: String,
    },

    /// Non-success response from an external API
    #[error("API error {status} from {context}: {message}")]
    Api {
        status: u16,
        context: String,
        message: String,
    },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScopeError {
    /// Whether this error ends the current pipeline run.
    ///
    /// Enrichment-level failures are contained by the orchestrator and never
    /// abort a run once scraping has succeeded.
    pub fn aborts_run(&self) -> bool {
        !matches!(
            self,
            ScopeError::Enrichment { .. }
                | ScopeError::AggregateEnrichment(_)
                | ScopeError::MalformedResponse { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ReviewScope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_errors_are_contained() {
        let err = ScopeError::Enrichment {
            place: "Cafe A".to_string(),
            message: "boom".to_string(),
        };
        assert!(!err.aborts_run());
        assert!(!ScopeError::AggregateEnrichment("x".to_string()).aborts_run());
    }

    #[test]
    fn test_job_errors_abort_run() {
        let err = ScopeError::PollTimeout {
            job_id: "run-1".to_string(),
            attempts: 3,
        };
        assert!(err.aborts_run());
        assert!(ScopeError::Validation("empty".to_string()).aborts_run());
    }
}
