use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur while building,
/// syncing and querying the dataset indexes. It uses the `thiserror` crate for
/// ergonomic error handling and automatic conversion from underlying library
/// errors.
///
/// # Error Conversion
///
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// HTTP errors are mapped by the clients into `ClientError`, `NetworkError`,
/// `Timeout` or `RateLimitExceeded` so this crate does not depend on reqwest.
///
/// # Examples
///
/// ```no_run
/// use vbd_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     // Errors automatically convert
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client request failed.
    ///
    /// This error occurs when HTTP requests fail due to network issues,
    /// timeouts, or server errors.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// The search engine answered with an error status.
    #[error("Search engine error (HTTP {status}): {message}")]
    SearchEngineError { status: u16, message: String },

    /// JSON serialization or deserialization failed.
    ///
    /// This error occurs when converting between Rust types and JSON,
    /// typically when parsing API responses or building documents.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error.
    ///
    /// This error occurs when a network request fails due to connectivity issues,
    /// DNS resolution failures, or the remote server being unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// A document does not satisfy its index mapping.
    ///
    /// Raised both by local validation and when the search engine rejects a
    /// write. The document itself is defective; sending it again cannot succeed.
    #[error("Schema violation in document {id}: {reason}")]
    SchemaViolation { id: String, reason: String },

    /// A live index mapping cannot be updated in place to the wanted mapping.
    #[error("Mapping conflict on index '{index}': {details}")]
    MappingConflict { index: String, details: String },

    /// A mapping declares the same field twice.
    #[error("Duplicate mapping property: {0}")]
    DuplicateProperty(String),

    /// Two sources claim the same index name.
    #[error("Duplicate index name: {0}")]
    DuplicateIndexName(String),

    /// A source name that is not in the registry.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Configuration file is missing, unreadable or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The service may be slow or unreachable.\n   Try again later.".to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect: {}\n   Check your internet connection and the service URL.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::SearchEngineError { status, message } => {
                if *status == 401 || *status == 403 {
                    "The search engine refused the credentials.\n   Check SEARCH_URL.".to_string()
                } else {
                    format!("Search engine error (HTTP {}): {}", status, message)
                }
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The server may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::EmptyResponse => {
                "The API returned no data. The service may be temporarily unavailable.".to_string()
            }
            AppError::MappingConflict { index, details } => {
                format!(
                    "Index '{}' has an incompatible mapping: {}\n   Reindex into a fresh index before syncing again.",
                    index, details
                )
            }
            AppError::UnknownSource(name) => {
                format!("Unknown source '{}'.\n   Known sources: gbif", name)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use vbd_core::error::AppError;
    ///
    /// // Network errors are retryable
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// // A document rejected by its mapping is NOT retryable
    /// let err = AppError::SchemaViolation { id: "x".into(), reason: "unknown field".into() };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::ClientError(_) => true,
            AppError::SearchEngineError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
