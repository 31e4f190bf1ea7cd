//! Booking endpoints.

use super::{AppState, RequestActor};
use crate::error::AppError;
use crate::payments::types::MethodParams;
use crate::services::booking_service::{BookingView, CanceledBooking, CreateBookingRequest};
use crate::services::booking_state::{BookingRecord, BookingStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

pub async fn create_booking(
    State(state): State<AppState>,
    caller: RequestActor,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    info!(
        actor = %caller.actor.id,
        service_ref = %request.service_ref,
        method = %request.params.method(),
        "Booking requested"
    );
    let view = state
        .bookings
        .create(&caller.actor, request)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    let view = state
        .bookings
        .get(&caller.actor, id)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(view))
}

pub async fn change_status(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<BookingRecord>, AppError> {
    let booking = state
        .bookings
        .change_status(&caller.actor, id, request.status, request.reason.as_deref())
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<CanceledBooking>, AppError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "no reason given".to_string());
    let canceled = state
        .bookings
        .cancel(&caller.actor, id, &reason)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(canceled))
}

/// New payment attempt after a declined card or an expired QR code.
pub async fn retry_payment(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(id): Path<Uuid>,
    Json(params): Json<MethodParams>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let view = state
        .bookings
        .retry_payment(&caller.actor, id, params)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(view)))
}
