//! Per-method payment behavior.
//!
//! A strategy never writes to storage. It builds the record to insert, and
//! describes follow-up changes as guarded updates that the caller applies with
//! a conditional write. External calls happen here, outside any lock.

use crate::payments::error::PaymentResult;
use crate::payments::provider::{CardGatewayClient, ChargeOutcome, RefundResult};
use crate::payments::qr::generate_reference;
use crate::payments::types::{
    MethodParams, PaymentMethod, PaymentPatch, PaymentRecord, PaymentRequest, PaymentStatus,
};
use crate::payments::utils::with_timeout;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A patch that may only land while the record still has status `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedUpdate {
    pub expected: PaymentStatus,
    /// When set, the stored record must also still be at this version.
    pub version: Option<i64>,
    pub patch: PaymentPatch,
}

impl GuardedUpdate {
    pub fn new(expected: PaymentStatus, patch: PaymentPatch) -> Self {
        Self {
            expected,
            version: None,
            patch,
        }
    }

    /// Pins the write to the snapshot it was computed from.
    pub fn at_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundPlan {
    NotEligible,
    Apply(GuardedUpdate),
    Failed { reason: String },
}

#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Builds the initial record. No I/O.
    fn prepare(&self, request: &PaymentRequest, now: DateTime<Utc>) -> PaymentResult<PaymentRecord>;

    /// Gives the record a fresh unique key after a reference collision.
    /// Returns `false` when the method has nothing to rekey.
    fn rekey(&self, _record: &mut PaymentRecord, _attempt: u32) -> bool {
        false
    }

    /// Synchronous confirmation step run once the record is durable.
    async fn settle(&self, record: &PaymentRecord, params: &MethodParams) -> Option<GuardedUpdate>;

    /// Called only for `COMPLETED` records.
    async fn refund(&self, record: &PaymentRecord, reason: &str) -> RefundPlan;
}

fn base_record(request: &PaymentRequest, currency: &str, status: PaymentStatus, now: DateTime<Utc>) -> PaymentRecord {
    PaymentRecord::new(
        request.owner_id.trim(),
        request.service_ref.trim(),
        request.params.method(),
        status,
        request.amount.clone(),
        currency,
        now,
    )
}

// ---------------------------------------------------------------------------
// Cash on delivery
// ---------------------------------------------------------------------------

/// Collected in person; trusted at creation.
pub struct CodStrategy {
    currency: String,
}

impl CodStrategy {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl PaymentStrategy for CodStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cod
    }

    fn prepare(&self, request: &PaymentRequest, now: DateTime<Utc>) -> PaymentResult<PaymentRecord> {
        let mut record = base_record(request, &self.currency, PaymentStatus::Completed, now);
        record.paid_at = Some(now);
        record
            .notes
            .push("Cash on delivery: collected at appointment".to_string());
        Ok(record)
    }

    async fn settle(&self, _record: &PaymentRecord, _params: &MethodParams) -> Option<GuardedUpdate> {
        None
    }

    async fn refund(&self, _record: &PaymentRecord, _reason: &str) -> RefundPlan {
        RefundPlan::NotEligible
    }
}

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// Charged synchronously through the gateway. Never retried: a declined
/// attempt stays `FAILED` and the payer starts a new one.
pub struct CardStrategy {
    gateway: Arc<dyn CardGatewayClient>,
    currency: String,
    timeout: Duration,
}

impl CardStrategy {
    pub fn new(gateway: Arc<dyn CardGatewayClient>, currency: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            currency: currency.into(),
            timeout,
        }
    }

    fn failed(reason: String, note: String) -> GuardedUpdate {
        GuardedUpdate {
            expected: PaymentStatus::Processing,
            version: None,
            patch: PaymentPatch {
                status: Some(PaymentStatus::Failed),
                failure_reason: Some(reason),
                note: Some(note),
                ..PaymentPatch::default()
            },
        }
    }
}

#[async_trait]
impl PaymentStrategy for CardStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn prepare(&self, request: &PaymentRequest, now: DateTime<Utc>) -> PaymentResult<PaymentRecord> {
        let mut record = base_record(request, &self.currency, PaymentStatus::Processing, now);
        record
            .notes
            .push(format!("Card charge submitted to {}", self.gateway.name()));
        Ok(record)
    }

    async fn settle(&self, record: &PaymentRecord, params: &MethodParams) -> Option<GuardedUpdate> {
        let MethodParams::Card { card } = params else {
            let reason = "card details missing".to_string();
            return Some(Self::failed(reason.clone(), format!("Card charge not attempted: {}", reason)));
        };

        let outcome = with_timeout(
            self.gateway.name(),
            self.timeout,
            self.gateway
                .charge(&record.amount, &record.currency, card, &record.id.to_string()),
        )
        .await;

        let update = match outcome {
            Ok(ChargeOutcome::Approved { transaction_id }) => {
                info!(payment_id = %record.id, transaction_id = %transaction_id, "card charge approved");
                GuardedUpdate {
                    expected: PaymentStatus::Processing,
                    version: None,
                    patch: PaymentPatch {
                        status: Some(PaymentStatus::Completed),
                        note: Some(format!(
                            "Card charge approved by {} (transaction {})",
                            self.gateway.name(),
                            transaction_id
                        )),
                        external_transaction_id: Some(transaction_id),
                        paid_at: Some(Utc::now()),
                        ..PaymentPatch::default()
                    },
                }
            }
            Ok(ChargeOutcome::Declined { reason }) => {
                info!(payment_id = %record.id, reason = %reason, "card charge declined");
                Self::failed(reason.clone(), format!("Card charge declined: {}", reason))
            }
            Err(e) => {
                warn!(payment_id = %record.id, error = %e, "card charge errored");
                Self::failed(e.to_string(), format!("Card charge error: {}", e))
            }
        };
        Some(update)
    }

    async fn refund(&self, record: &PaymentRecord, reason: &str) -> RefundPlan {
        let Some(transaction_id) = record.external_transaction_id.as_deref() else {
            return RefundPlan::Failed {
                reason: "no gateway transaction id on record".to_string(),
            };
        };

        match with_timeout(self.gateway.name(), self.timeout, self.gateway.refund(transaction_id)).await {
            Ok(RefundResult::Refunded { refund_id }) => RefundPlan::Apply(GuardedUpdate {
                expected: PaymentStatus::Completed,
                version: None,
                patch: PaymentPatch {
                    status: Some(PaymentStatus::Refunded),
                    refund_amount: Some(record.amount.clone()),
                    refunded_at: Some(Utc::now()),
                    note: Some(format!(
                        "Card refund {} issued for {} {} (charge {}). Reason: {}",
                        refund_id, record.amount, record.currency, transaction_id, reason
                    )),
                    refund_id: Some(refund_id),
                    ..PaymentPatch::default()
                },
            }),
            Ok(RefundResult::Rejected { reason }) => RefundPlan::Failed { reason },
            Err(e) => RefundPlan::Failed {
                reason: e.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// QR bank transfer
// ---------------------------------------------------------------------------

/// Pending until the reconciliation poller (or staff) sees the transfer.
pub struct QrStrategy {
    currency: String,
    ttl: ChronoDuration,
}

impl QrStrategy {
    pub fn new(currency: impl Into<String>, ttl: ChronoDuration) -> Self {
        Self {
            currency: currency.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> ChronoDuration {
        self.ttl
    }

    /// New reference and a full new lifetime for a still-pending record.
    /// `attempt` shifts the reference past earlier collisions.
    pub fn refresh(&self, record: &PaymentRecord, now: DateTime<Utc>, attempt: u32) -> GuardedUpdate {
        let mut millis = now.timestamp_millis() + i64::from(attempt);
        let mut reference = generate_reference(&record.service_ref, &record.owner_id, millis);
        while record.qr_reference.as_deref() == Some(reference.as_str()) {
            millis += 1;
            reference = generate_reference(&record.service_ref, &record.owner_id, millis);
        }
        let expires_at = now + self.ttl;
        GuardedUpdate {
            expected: PaymentStatus::Pending,
            version: None,
            patch: PaymentPatch {
                note: Some(format!(
                    "QR regenerated: {} replaces {}, expires {}",
                    reference,
                    record.qr_reference.as_deref().unwrap_or("-"),
                    expires_at.to_rfc3339()
                )),
                qr_reference: Some(reference),
                qr_expires_at: Some(expires_at),
                ..PaymentPatch::default()
            },
        }
    }
}

#[async_trait]
impl PaymentStrategy for QrStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Qr
    }

    fn prepare(&self, request: &PaymentRequest, now: DateTime<Utc>) -> PaymentResult<PaymentRecord> {
        let mut record = base_record(request, &self.currency, PaymentStatus::Pending, now);
        let reference = generate_reference(&record.service_ref, &record.owner_id, now.timestamp_millis());
        let expires_at = now + self.ttl;
        record.notes.push(format!(
            "QR payment created with reference {}, expires {}",
            reference,
            expires_at.to_rfc3339()
        ));
        record.qr_reference = Some(reference);
        record.qr_expires_at = Some(expires_at);
        Ok(record)
    }

    fn rekey(&self, record: &mut PaymentRecord, attempt: u32) -> bool {
        let millis = record.created_at.timestamp_millis() + i64::from(attempt);
        record.qr_reference = Some(generate_reference(&record.service_ref, &record.owner_id, millis));
        true
    }

    async fn settle(&self, _record: &PaymentRecord, _params: &MethodParams) -> Option<GuardedUpdate> {
        None
    }

    async fn refund(&self, record: &PaymentRecord, reason: &str) -> RefundPlan {
        // No automated transfer exists; REFUNDED here is bookkeeping for staff.
        RefundPlan::Apply(GuardedUpdate {
            expected: PaymentStatus::Completed,
            version: None,
            patch: PaymentPatch {
                status: Some(PaymentStatus::Refunded),
                refund_amount: Some(record.amount.clone()),
                refunded_at: Some(Utc::now()),
                note: Some(format!(
                    "QR refund - Reason: {} | Original QR: {} | Amount: {} {} | Bank TX: {} | Requires manual bank transfer",
                    reason,
                    record.qr_reference.as_deref().unwrap_or("-"),
                    record.amount,
                    record.currency,
                    record.external_transaction_id.as_deref().unwrap_or("-")
                )),
                ..PaymentPatch::default()
            },
        })
    }
}
