// src/utils/error.rs

use serde::{Deserialize, Serialize};
use std::fmt;

pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for the synchronization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub message: String,
    pub status: Option<u16>,
    pub error_code: Option<String>,
    /// Number of attempts consumed before the error surfaced. Set by the
    /// retry policy so callers can distinguish "never succeeded" from
    /// "succeeded after N attempts".
    pub attempts: Option<u32>,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    UnknownError,
    ApiError,
    NetworkError,
    TimeoutError,
    RateLimitError,
    ValidationError,
    MappingError,
    AuthenticationError,
    ConfigurationError,
    DeserializationError,
    DatabaseError,
    NotFoundError,
}

/// HTTP status codes that mark a failed remote call as transient.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            error_code: None,
            attempts: None,
            kind,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Whether the retry policy may re-run the failed operation. Covers
    /// network-level failures and the transient HTTP status codes.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::NetworkError | ErrorKind::TimeoutError | ErrorKind::RateLimitError => true,
            _ => self
                .status
                .map(|s| RETRYABLE_STATUSES.contains(&s))
                .unwrap_or(false),
        }
    }

    // Convenience constructors for common error types
    pub fn network_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NetworkError, message)
            .with_status(503)
            .with_code("NETWORK_ERROR")
    }

    pub fn timeout_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeoutError, message)
            .with_status(408)
            .with_code("TIMEOUT_ERROR")
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message).with_code("API_ERROR")
    }

    pub fn rate_limit_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::RateLimitError, message)
            .with_status(429)
            .with_code("RATE_LIMIT")
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
            .with_status(400)
            .with_code("VALIDATION_ERROR")
    }

    pub fn mapping_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MappingError, message).with_code("MAPPING_ERROR")
    }

    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationError, message)
            .with_status(401)
            .with_code("AUTH_ERROR")
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message).with_code("CONFIG_ERROR")
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeserializationError, message).with_code("PARSE_ERROR")
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseError, message).with_code("DATABASE_ERROR")
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NotFoundError, message)
            .with_status(404)
            .with_code("NOT_FOUND")
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::parse_error(format!("JSON parsing error: {}", err))
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::validation_error(format!("URL parse error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::timeout_error(format!("HTTP request timed out: {}", err))
        } else if err.is_connect() {
            SyncError::network_error(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            SyncError::api_error(format!("HTTP error: {}", err)).with_status(status.as_u16())
        } else {
            SyncError::network_error(format!("HTTP request failed: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::network_error("reset").is_retryable());
        assert!(SyncError::timeout_error("slow").is_retryable());
        assert!(SyncError::rate_limit_error("429").is_retryable());
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(SyncError::api_error("transient").with_status(status).is_retryable());
        }
        assert!(!SyncError::api_error("bad request").with_status(400).is_retryable());
        assert!(!SyncError::validation_error("missing name").is_retryable());
        assert!(!SyncError::authentication_error("bad token").is_retryable());
    }

    #[test]
    fn test_attempt_tagging() {
        let err = SyncError::network_error("down").with_attempts(3);
        assert_eq!(err.attempts, Some(3));
        assert_eq!(err.kind, ErrorKind::NetworkError);
    }
}
