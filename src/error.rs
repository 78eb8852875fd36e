use thiserror::Error;

/// Type alias for Result with CleanerError
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Error types for the domain cleaner
///
/// Variants up to `InvalidResponse` describe a failed request against the
/// remote mailbox; see [`CleanerError::is_remote`].
#[derive(Error, Debug)]
pub enum CleanerError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// The API answered but the payload was unusable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// An operation needing the mailbox was called before authenticating
    #[error("Not authenticated. Run `gmail-domain-cleaner auth` first")]
    NotAuthenticated,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// User cancelled operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CleanerError {
    /// Whether this error came from a request against the mailbox
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            CleanerError::ApiError(_)
                | CleanerError::RateLimitExceeded { .. }
                | CleanerError::NetworkError(_)
                | CleanerError::ServerError { .. }
                | CleanerError::NotFound(_)
                | CleanerError::BadRequest(_)
                | CleanerError::Forbidden(_)
                | CleanerError::InvalidResponse(_)
        )
    }

    /// Check if the error is transient and should be retried by the transport
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CleanerError::RateLimitExceeded { .. }
                | CleanerError::ServerError { .. }
                | CleanerError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// Accepts delay-seconds ("120") or an HTTP-date. Missing, invalid or past
/// values fall back to 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                if let Ok(duration) = http_date.duration_since(std::time::SystemTime::now()) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<google_gmail1::Error> for CleanerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => CleanerError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => CleanerError::NotFound(message),
                    400 => CleanerError::BadRequest(message),
                    403 => CleanerError::Forbidden(message),
                    500..=599 => CleanerError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => CleanerError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => {
                CleanerError::BadRequest(format!("{}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                CleanerError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => CleanerError::NetworkError(err.to_string()),
            google_gmail1::Error::JsonDecodeError(_, err) => {
                CleanerError::InvalidResponse(err.to_string())
            }
            google_gmail1::Error::MissingToken(ref err) => {
                CleanerError::AuthError(format!("Missing token: {}", err))
            }
            _ => CleanerError::ApiError(error.to_string()),
        }
    }
}
