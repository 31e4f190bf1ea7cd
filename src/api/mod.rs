//! HTTP boundary.
//!
//! Callers identify themselves with `x-actor-id` and `x-actor-role`; the
//! headers are trusted as-is.

pub mod bookings;
pub mod health;
pub mod payments;

use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId, REQUEST_ID_HEADER};
use crate::services::{Actor, ActorRole, BookingService, PaymentService};
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub bookings: BookingService,
    pub health: HealthChecker,
}

/// The calling actor plus the request id used to tag errors.
#[derive(Debug, Clone)]
pub struct RequestActor {
    pub actor: Actor,
    pub request_id: Option<String>,
}

impl RequestActor {
    /// Converts a library error and tags it with this request's id.
    pub fn fail(&self, err: impl Into<AppError>) -> AppError {
        let err = err.into();
        match &self.request_id {
            Some(id) => err.with_request_id(id.clone()),
            None => err,
        }
    }

    /// Customers may only see their own records.
    pub fn ensure_owner(&self, owner_id: &str) -> Result<(), AppError> {
        if self.actor.is_staff() || self.actor.id == owner_id {
            Ok(())
        } else {
            Err(self.fail(
                AppError::new(AppErrorKind::Domain(DomainError::Forbidden {
                    reason: "record belongs to another customer".to_string(),
                }))
                .with_context(format!("actor {} is not the owner", self.actor.id)),
            ))
        }
    }

    pub fn ensure_staff(&self) -> Result<(), AppError> {
        if self.actor.is_staff() {
            Ok(())
        } else {
            Err(self.fail(
                AppError::new(AppErrorKind::Domain(DomainError::Forbidden {
                    reason: "staff only".to_string(),
                }))
                .with_context(format!("actor {} is not staff", self.actor.id)),
            ))
        }
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header(parts, REQUEST_ID_HEADER);
        let tag = |err: AppError| match &request_id {
            Some(id) => err.with_request_id(id.clone()),
            None => err,
        };

        let id = header(parts, ACTOR_ID_HEADER).ok_or_else(|| {
            tag(AppError::new(AppErrorKind::Validation(
                ValidationError::MissingField {
                    field: ACTOR_ID_HEADER.to_string(),
                },
            )))
        })?;
        let role = match header(parts, ACTOR_ROLE_HEADER) {
            None => ActorRole::Customer,
            Some(raw) => raw.parse::<ActorRole>().map_err(|reason| {
                tag(AppError::new(AppErrorKind::Validation(
                    ValidationError::InvalidField {
                        field: ACTOR_ROLE_HEADER.to_string(),
                        reason,
                    },
                )))
            })?,
        };

        Ok(Self {
            actor: Actor { id, role },
            request_id,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/{id}", get(bookings::get_booking))
        .route("/api/bookings/{id}/status", post(bookings::change_status))
        .route("/api/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/{id}/payment", post(bookings::retry_payment))
        .route("/api/payments/{id}", get(payments::get_payment))
        .route("/api/payments/owner/{owner_id}", get(payments::payment_history))
        .route("/api/payments/{id}/qr/regenerate", post(payments::regenerate_qr))
        .route("/api/payments/qr/{reference}", get(payments::qr_status))
        .route("/api/payments/qr/{reference}/confirm", post(payments::confirm_qr))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
