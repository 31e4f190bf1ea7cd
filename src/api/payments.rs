//! Payment queries and QR operations.

use super::{AppState, RequestActor};
use crate::error::AppError;
use crate::payments::types::{InitiatedPayment, PaymentRecord};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ManualConfirmRequest {
    pub external_transaction_id: Option<String>,
    pub note: Option<String>,
}

pub async fn get_payment(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(id): Path<Uuid>,
) -> Result<Json<InitiatedPayment>, AppError> {
    let record = state.payments.get(id).await.map_err(|e| caller.fail(e))?;
    caller.ensure_owner(&record.owner_id)?;
    Ok(Json(state.payments.present(record)))
}

pub async fn payment_history(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<PaymentRecord>>, AppError> {
    caller.ensure_owner(&owner_id)?;
    let records = state
        .payments
        .history_by_owner(&owner_id)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(records))
}

pub async fn qr_status(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(reference): Path<String>,
) -> Result<Json<InitiatedPayment>, AppError> {
    let status = state
        .payments
        .status_by_reference(&reference)
        .await
        .map_err(|e| caller.fail(e))?;
    caller.ensure_owner(&status.record.owner_id)?;
    Ok(Json(status))
}

pub async fn regenerate_qr(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(id): Path<Uuid>,
) -> Result<Json<InitiatedPayment>, AppError> {
    let regenerated = state
        .bookings
        .regenerate_qr(&caller.actor, id)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(regenerated))
}

/// Staff override for a transfer the reconciliation poller has not matched.
pub async fn confirm_qr(
    State(state): State<AppState>,
    caller: RequestActor,
    Path(reference): Path<String>,
    body: Option<Json<ManualConfirmRequest>>,
) -> Result<Json<PaymentRecord>, AppError> {
    caller.ensure_staff()?;
    let Json(request) = body.unwrap_or_default();
    let record = state
        .payments
        .manual_confirm_qr(
            &reference,
            &caller.actor.id,
            request.external_transaction_id,
            request.note,
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(record))
}
