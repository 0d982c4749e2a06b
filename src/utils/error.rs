use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Malformed {backend} response: {reason}")]
    MalformedBackendResponse { backend: String, reason: String },

    #[error("Query rendering failed: {message}")]
    QueryRender { message: String },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Request,
    Backend,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnalyticsError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. } => ErrorCategory::Request,
            Self::BackendUnavailable { .. }
            | Self::MalformedBackendResponse { .. }
            | Self::ApiError(_) => ErrorCategory::Backend,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::QueryRender { .. } | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Request => ErrorSeverity::High,
            ErrorCategory::Backend => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
            ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    /// 給終端使用者看的簡短訊息
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InvalidRequest { message } => format!("Request rejected: {}", message),
            Self::BackendUnavailable { backend, .. } => {
                format!("The {} service could not be reached", backend)
            }
            Self::MalformedBackendResponse { backend, .. } => {
                format!("The {} service returned an unexpected response", backend)
            }
            Self::MissingConfigError { field } => {
                format!("Missing configuration value: {}", field)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Request => {
                "Check the dataset, region (iso or geom), dates (yyyy-mm-dd) and layer parameters"
            }
            ErrorCategory::Backend => "Retry later or check the backend endpoint and credentials",
            ErrorCategory::Configuration => "Check the TOML configuration and environment variables",
            ErrorCategory::Internal => "Run with --verbose and report the log output",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_is_high_severity() {
        let err = AnalyticsError::invalid_request("no iso or geom");
        assert_eq!(err.category(), ErrorCategory::Request);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.to_string(), "Invalid request: no iso or geom");
    }

    #[test]
    fn test_backend_errors_are_recoverable() {
        let err = AnalyticsError::BackendUnavailable {
            backend: "cartodb".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Backend);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(
            err.user_friendly_message(),
            "The cartodb service could not be reached"
        );
    }
}
