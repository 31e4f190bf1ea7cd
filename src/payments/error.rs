use crate::database::error::DatabaseError;
use crate::payments::types::PaymentStatus;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Always a logic or race bug on the caller's side; never retried.
    #[error("Invalid payment transition from {current} to {requested}")]
    InvalidTransition {
        current: PaymentStatus,
        requested: PaymentStatus,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("External service error: service={service}, message={message}")]
    ExternalService {
        service: String,
        message: String,
        retryable: bool,
    },

    #[error("External service timeout: service={service} after {timeout_secs}s")]
    Timeout { service: String, timeout_secs: u64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PaymentError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        PaymentError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Validation { .. } => false,
            PaymentError::InvalidTransition { .. } => false,
            PaymentError::NotFound { .. } => false,
            PaymentError::ExternalService { retryable, .. } => *retryable,
            PaymentError::Timeout { .. } => true,
            PaymentError::Database(err) => err.is_retryable(),
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Validation { .. } => 400,
            PaymentError::InvalidTransition { .. } => 409,
            PaymentError::NotFound { .. } => 404,
            PaymentError::ExternalService { .. } => 502,
            PaymentError::Timeout { .. } => 504,
            PaymentError::Database(_) => 500,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{
            AppError, AppErrorKind, DomainError, ExternalError, ValidationError,
        };

        let kind = match err {
            PaymentError::Validation { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            PaymentError::InvalidTransition { current, requested } => {
                AppErrorKind::Domain(DomainError::InvalidTransition {
                    entity: "Payment".to_string(),
                    current: current.to_string(),
                    requested: requested.to_string(),
                })
            }
            PaymentError::NotFound { entity, id } => {
                AppErrorKind::Domain(DomainError::NotFound { entity, id })
            }
            PaymentError::ExternalService {
                service,
                message,
                retryable,
            } => AppErrorKind::External(ExternalError::Service {
                service,
                message,
                is_retryable: retryable,
            }),
            PaymentError::Timeout {
                service,
                timeout_secs,
            } => AppErrorKind::External(ExternalError::Timeout {
                service,
                timeout_secs,
            }),
            PaymentError::Database(db) => return AppError::from(db),
        };
        AppError::new(kind)
    }
}
