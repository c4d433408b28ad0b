use thiserror::Error;

/// Error types for ingestion, market data and storage operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Reddit API error: {0}")]
    Reddit(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("API error: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimit { retry_after: u64 },

    #[error("Timeout error: operation took longer than {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("Data validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for data operations
pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::Network(_) => true,
            DataError::Reddit(_) => true,
            DataError::RateLimit { .. } => true,
            DataError::Timeout { .. } => true,
            DataError::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }

    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        DataError::Parse {
            message: message.into(),
        }
    }

    pub fn validation_error<S: Into<String>>(field: S, message: S) -> Self {
        DataError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn api_error<S: Into<String>>(status_code: u16, message: S) -> Self {
        DataError::Api {
            status_code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DataError::RateLimit { retry_after: 3 }.is_retryable());
        assert!(DataError::api_error(503, "unavailable").is_retryable());
        assert!(DataError::api_error(429, "slow down").is_retryable());
        assert!(!DataError::api_error(404, "missing").is_retryable());
        assert!(!DataError::parse_error("bad json").is_retryable());
    }

    #[test]
    fn test_reddit_errors_are_retryable() {
        assert!(DataError::Reddit("503 from listing".to_string()).is_retryable());
        assert!(!DataError::Config("missing key".to_string()).is_retryable());
        assert!(!DataError::validation_error("symbol", "too long").is_retryable());
    }
}
