use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::MAX_UPLOAD_BYTES;

/// Failure of one backend request, already classified. Travels inside events,
/// so it has to stay serialisable.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("response is missing field '{field}'")]
    MissingField { field: String },

    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("request could not be built: {reason}")]
    InvalidRequest { reason: String },

    #[error("gave up after {attempts} status checks")]
    PollLimitReached { attempts: u32 },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Backend,
    MissingField,
    MalformedResponse,
    Validation,
    InvalidState,
    Configuration,
    MediaTooLarge,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Backend => "BACKEND_ERROR",
            Self::MissingField => "MISSING_FIELD",
            Self::MalformedResponse => "MALFORMED_RESPONSE",
            Self::Validation => "VALIDATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::MediaTooLarge => "MEDIA_TOO_LARGE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Backend => ErrorSeverity::Transient,
            Self::MissingField
            | Self::MalformedResponse
            | Self::Validation
            | Self::InvalidState
            | Self::MediaTooLarge => ErrorSeverity::Permanent,
            Self::Configuration | Self::Internal => ErrorSeverity::Fatal,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Backend | Self::MissingField | Self::MalformedResponse
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    /// Turns a failed backend call into the alert shown for that step.
    #[must_use]
    pub fn from_api(error: &ApiError, message: impl Into<String>) -> Self {
        AppError::from(error.clone()).with_message(message)
    }

    #[must_use]
    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation
            | ErrorKind::InvalidState
            | ErrorKind::Network
            | ErrorKind::Backend
            | ErrorKind::MissingField
            | ErrorKind::MalformedResponse => self.message.clone(),
            ErrorKind::Configuration => {
                "The app is not configured correctly. Please contact support.".into()
            }
            ErrorKind::MediaTooLarge => format!(
                "The file is too large. Please keep it under {} MB.",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            ),
            ErrorKind::Internal => {
                "An unexpected error occurred. Please try again.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        let internal = e.to_string();
        let app = match &e {
            ApiError::Network { .. } => AppError::new(
                ErrorKind::Network,
                "Unable to connect. Please check your internet connection and try again.",
            ),
            ApiError::Backend { status, .. } => {
                AppError::new(ErrorKind::Backend, "The emergency service returned an error.")
                    .with_context("http_status", status.to_string())
            }
            ApiError::MissingField { field } => {
                AppError::new(ErrorKind::MissingField, "The emergency service sent an incomplete reply.")
                    .with_context("field", field.clone())
            }
            ApiError::MalformedResponse { .. } => AppError::new(
                ErrorKind::MalformedResponse,
                "The emergency service sent an unreadable reply.",
            ),
            ApiError::InvalidRequest { .. } => {
                AppError::new(ErrorKind::Internal, "The request could not be prepared.")
            }
            ApiError::PollLimitReached { .. } => AppError::new(
                ErrorKind::Network,
                "We lost track of the emergency call. Please try again.",
            ),
        };
        app.with_internal(internal)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_to_app_error() {
        let err = AppError::from(ApiError::Backend {
            status: 503,
            message: "down".into(),
        });
        assert_eq!(err.kind, ErrorKind::Backend);
        assert_eq!(err.code(), "BACKEND_ERROR");
        assert_eq!(err.context.get("http_status").map(String::as_str), Some("503"));
        assert!(err.is_retryable());
        assert!(err.internal_message.unwrap().contains("503"));
    }

    #[test]
    fn test_from_api_keeps_step_message() {
        let err = AppError::from_api(
            &ApiError::network("connection refused"),
            "Failed to process audio. Please try again.",
        );
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(
            err.user_facing_message(),
            "Failed to process audio. Please try again."
        );
    }

    #[test]
    fn test_user_facing_error_projection() {
        let err = AppError::new(ErrorKind::Configuration, "bad url");
        let view = UserFacingError::from(&err);
        assert!(!view.is_retryable);
        assert!(!view.is_transient);
        assert_eq!(view.error_code, "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_display_includes_internal() {
        let err = AppError::new(ErrorKind::Internal, "boom").with_internal("detail");
        assert_eq!(err.to_string(), "[INTERNAL_ERROR] boom (internal: detail)");
    }
}
