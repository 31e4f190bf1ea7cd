//! Unified error handling for the booking engine
//!
//! Every library error converts into `AppError`, which carries the HTTP
//! status mapping, a machine-readable code and a user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "PAYMENT_NOT_SETTLED")]
    PaymentNotSettled,
    #[serde(rename = "INVALID_TRANSITION")]
    InvalidTransition,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "CANCELLATION_WINDOW_CLOSED")]
    CancellationWindowClosed,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 504)
    #[serde(rename = "EXTERNAL_SERVICE_ERROR")]
    ExternalServiceError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Booking confirmation against an unpaid card or QR payment
    PaymentNotSettled { payment_id: String, status: String },
    /// State machine violation on a payment or booking
    InvalidTransition {
        entity: String,
        current: String,
        requested: String,
    },
    NotFound { entity: String, id: String },
    /// Cancellation attempted inside the lead-time window
    CancellationWindowClosed {
        appointment_at: String,
        lead_time_hours: i64,
    },
    Forbidden { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Card gateway and bank ledger failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    Service {
        service: String,
        message: String,
        is_retryable: bool,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    MissingField { field: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotSettled { .. } => 409,
                DomainError::InvalidTransition { .. } => 409,
                DomainError::NotFound { .. } => 404,
                DomainError::CancellationWindowClosed { .. } => 422,
                DomainError::Forbidden { .. } => 403,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Service { .. } => 502,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotSettled { .. } => ErrorCode::PaymentNotSettled,
                DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                DomainError::NotFound { .. } => ErrorCode::NotFound,
                DomainError::CancellationWindowClosed { .. } => {
                    ErrorCode::CancellationWindowClosed
                }
                DomainError::Forbidden { .. } => ErrorCode::Forbidden,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(_) => ErrorCode::ExternalServiceError,
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotSettled { status, .. } => format!(
                    "Payment has not been completed yet (status {}). Please complete payment first",
                    status
                ),
                DomainError::InvalidTransition {
                    entity,
                    current,
                    requested,
                } => format!(
                    "{} cannot move from {} to {}",
                    entity, current, requested
                ),
                DomainError::NotFound { entity, id } => format!("{} '{}' not found", entity, id),
                DomainError::CancellationWindowClosed {
                    lead_time_hours, ..
                } => format!(
                    "Cannot cancel within {} hours of the appointment",
                    lead_time_hours
                ),
                DomainError::Forbidden { reason } => reason.clone(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Service {
                    service,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "{} is temporarily unavailable. Please try again",
                            service
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => format!(
                    "{} request timed out after {} seconds. Please try again",
                    service, timeout_secs
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Service { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError>, From<PaymentError> and From<BookingError> live next to
// their error types.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_not_settled_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::PaymentNotSettled {
            payment_id: "p-1".to_string(),
            status: "PENDING".to_string(),
        }));

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::PaymentNotSettled);
        assert!(error.user_message().contains("complete payment"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_cancellation_window_error() {
        let error = AppError::new(AppErrorKind::Domain(
            DomainError::CancellationWindowClosed {
                appointment_at: "2026-01-01T09:00:00Z".to_string(),
                lead_time_hours: 24,
            },
        ));

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::CancellationWindowClosed);
        assert!(error.user_message().contains("24 hours"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let error = AppError::new(AppErrorKind::External(ExternalError::Timeout {
            service: "card gateway".to_string(),
            timeout_secs: 15,
        }));

        assert_eq!(error.status_code(), 504);
        assert_eq!(error.error_code(), ErrorCode::ExternalServiceError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::CancellationWindowClosed).unwrap();
        assert_eq!(json, "\"CANCELLATION_WINDOW_CLOSED\"");
    }

    #[test]
    fn test_error_with_request_id() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: "service_ref".to_string(),
        }))
        .with_request_id("req-123");

        assert_eq!(error.request_id, Some("req-123".to_string()));
        assert_eq!(error.status_code(), 400);
    }
}
