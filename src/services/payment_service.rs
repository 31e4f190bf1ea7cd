//! Payment lifecycle operations.
//!
//! Owns every status write to a `PaymentRecord`. Writes go through
//! [`PaymentService::apply`], which checks the edge against the state machine
//! and then lets the store apply it only if the record is still in the
//! expected status. A write that loses a race is dropped, not retried.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MerchantConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::PaymentRepository;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::factory::PaymentStrategies;
use crate::payments::provider::LedgerTransaction;
use crate::payments::qr::build_instructions;
use crate::payments::state::validate_transition;
use crate::payments::strategy::{GuardedUpdate, PaymentStrategy};
use crate::payments::types::{
    InitiatedPayment, MethodParams, PaymentMethod, PaymentPatch, PaymentRecord, PaymentRequest,
    PaymentStatus,
};
use crate::services::notification::{NotificationEvent, Notifier};

/// Upper bound on QR reference recomputation after unique-index collisions.
pub const MAX_REFERENCE_ATTEMPTS: u32 = 5;

/// Inserts `record` through `insert`, rekeying it through the strategy on a
/// unique violation.
pub(crate) async fn insert_with_rekey<T, F, Fut>(
    strategy: &dyn PaymentStrategy,
    mut record: PaymentRecord,
    mut insert: F,
) -> PaymentResult<T>
where
    F: FnMut(PaymentRecord) -> Fut,
    Fut: Future<Output = Result<T, DatabaseError>>,
{
    let mut attempt = 0;
    loop {
        match insert(record.clone()).await {
            Ok(stored) => return Ok(stored),
            Err(e)
                if e.is_unique_violation()
                    && attempt + 1 < MAX_REFERENCE_ATTEMPTS
                    && strategy.rekey(&mut record, attempt + 1) =>
            {
                attempt += 1;
                debug!(
                    payment_id = %record.id,
                    attempt = attempt,
                    qr_reference = ?record.qr_reference,
                    "QR reference collision, recomputed"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    strategies: PaymentStrategies,
    merchant: MerchantConfig,
    notifier: Notifier,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        strategies: PaymentStrategies,
        merchant: MerchantConfig,
        notifier: Notifier,
    ) -> Self {
        Self {
            payments,
            strategies,
            merchant,
            notifier,
        }
    }

    pub fn strategies(&self) -> &PaymentStrategies {
        &self.strategies
    }

    /// Validates the request and builds the initial record without storing it.
    pub fn prepare(
        &self,
        request: &PaymentRequest,
    ) -> PaymentResult<(Arc<dyn PaymentStrategy>, PaymentRecord)> {
        request.validate()?;
        let strategy = self.strategies.get_strategy(request.params.method());
        let record = strategy.prepare(request, Utc::now())?;
        Ok((strategy, record))
    }

    /// Creates exactly one payment record and runs its synchronous
    /// confirmation step.
    pub async fn initiate(&self, request: PaymentRequest) -> PaymentResult<InitiatedPayment> {
        let (strategy, record) = self.prepare(&request)?;
        let repo = self.payments.clone();
        let stored = insert_with_rekey(strategy.as_ref(), record, move |record| {
            let repo = repo.clone();
            async move { repo.insert_payment(&record).await }
        })
        .await?;

        info!(
            payment_id = %stored.id,
            owner_id = %stored.owner_id,
            method = %stored.method,
            status = %stored.status,
            amount = %stored.amount,
            "Payment initiated"
        );

        let settled = self.settle(stored, &request.params).await?;
        Ok(self.present(settled))
    }

    /// Runs the strategy's confirmation step against a stored record.
    pub async fn settle(
        &self,
        record: PaymentRecord,
        params: &MethodParams,
    ) -> PaymentResult<PaymentRecord> {
        let strategy = self.strategies.get_strategy(record.method);
        let Some(update) = strategy.settle(&record, params).await else {
            self.announce(&record);
            return Ok(record);
        };
        match self.apply(&record, update).await? {
            Some(updated) => {
                self.announce(&updated);
                Ok(updated)
            }
            None => self.get(record.id).await,
        }
    }

    /// Applies a guarded update. `Ok(None)` means the record had already left
    /// the expected status and nothing was written.
    pub async fn apply(
        &self,
        record: &PaymentRecord,
        update: GuardedUpdate,
    ) -> PaymentResult<Option<PaymentRecord>> {
        if let Some(next) = update.patch.status {
            if let Err(e) = validate_transition(update.expected, next) {
                error!(
                    payment_id = %record.id,
                    current = %update.expected,
                    requested = %next,
                    "Invalid payment transition"
                );
                return Err(e);
            }
        }

        match self
            .payments
            .update_if_status(record.id, update.expected, update.version, &update.patch)
            .await?
        {
            Some(updated) => {
                info!(
                    payment_id = %updated.id,
                    from = %update.expected,
                    status = %updated.status,
                    "Payment record updated"
                );
                Ok(Some(updated))
            }
            None => {
                debug!(
                    payment_id = %record.id,
                    expected = %update.expected,
                    "Payment no longer in expected status, update dropped"
                );
                Ok(None)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> PaymentResult<PaymentRecord> {
        self.payments
            .find_payment(id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Payment", id))
    }

    pub async fn history_by_owner(&self, owner_id: &str) -> PaymentResult<Vec<PaymentRecord>> {
        Ok(self.payments.find_payments_by_owner(owner_id.trim()).await?)
    }

    /// References are issued upper-case; lookups ignore case and surrounding
    /// whitespace.
    pub async fn find_by_reference(&self, reference: &str) -> PaymentResult<PaymentRecord> {
        let reference = reference.trim().to_ascii_uppercase();
        self.payments
            .find_payment_by_reference(&reference)
            .await?
            .ok_or_else(|| PaymentError::not_found("Payment", &reference))
    }

    /// Current state of a QR payment, with instructions while it is payable.
    pub async fn status_by_reference(&self, reference: &str) -> PaymentResult<InitiatedPayment> {
        let record = self.find_by_reference(reference).await?;
        Ok(self.present(record))
    }

    /// Pending QR payments still inside their lifetime.
    pub async fn reconcilable(&self, limit: i64) -> PaymentResult<Vec<PaymentRecord>> {
        Ok(self.payments.find_reconcilable(Utc::now(), limit).await?)
    }

    /// Pending QR payments whose lifetime has run out.
    pub async fn lapsed(&self, limit: i64) -> PaymentResult<Vec<PaymentRecord>> {
        Ok(self.payments.find_expired_pending(Utc::now(), limit).await?)
    }

    pub fn present(&self, record: PaymentRecord) -> InitiatedPayment {
        let instructions = if record.status == PaymentStatus::Pending {
            build_instructions(&self.merchant, &record)
        } else {
            None
        };
        InitiatedPayment {
            record,
            instructions,
        }
    }

    /// Extends a still-pending QR payment with a new reference and lifetime.
    pub async fn refresh_qr(&self, record: &PaymentRecord) -> PaymentResult<PaymentRecord> {
        self.refresh_qr_at(record, Utc::now()).await
    }

    pub(crate) async fn refresh_qr_at(
        &self,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> PaymentResult<PaymentRecord> {
        let mut attempt = 0;
        let applied = loop {
            let update = self.strategies.qr().refresh(record, now, attempt);
            match self.apply(record, update).await {
                Err(PaymentError::Database(e))
                    if e.is_unique_violation() && attempt + 1 < MAX_REFERENCE_ATTEMPTS =>
                {
                    attempt += 1;
                    debug!(
                        payment_id = %record.id,
                        attempt = attempt,
                        "QR reference collision on regeneration, recomputed"
                    );
                }
                other => break other?,
            }
        };

        match applied {
            Some(updated) => {
                info!(
                    payment_id = %updated.id,
                    qr_reference = ?updated.qr_reference,
                    "QR payment regenerated"
                );
                Ok(updated)
            }
            None => {
                let current = self.get(record.id).await?;
                error!(
                    payment_id = %record.id,
                    current = %current.status,
                    "QR regeneration lost a race with another status change"
                );
                Err(PaymentError::InvalidTransition {
                    current: current.status,
                    requested: PaymentStatus::Pending,
                })
            }
        }
    }

    /// Staff override for a bank transfer the poller has not seen.
    pub async fn manual_confirm_qr(
        &self,
        reference: &str,
        staff_id: &str,
        external_transaction_id: Option<String>,
        note: Option<String>,
    ) -> PaymentResult<PaymentRecord> {
        let record = self.find_by_reference(reference).await?;
        if record.method != PaymentMethod::Qr {
            return Err(PaymentError::Validation {
                message: "only QR payments can be confirmed manually".to_string(),
                field: Some("reference".to_string()),
            });
        }

        match record.status {
            PaymentStatus::Completed => {
                debug!(payment_id = %record.id, "QR payment already confirmed");
                Ok(record)
            }
            PaymentStatus::Pending => {
                let mut text = format!("Manually confirmed by staff {}", staff_id);
                if let Some(tx) = &external_transaction_id {
                    text.push_str(&format!(" | Bank TX: {}", tx));
                }
                if let Some(extra) = note.as_deref().filter(|n| !n.trim().is_empty()) {
                    text.push_str(&format!(" | {}", extra.trim()));
                }
                let update = GuardedUpdate {
                    expected: PaymentStatus::Pending,
                    version: None,
                    patch: PaymentPatch {
                        status: Some(PaymentStatus::Completed),
                        external_transaction_id,
                        paid_at: Some(Utc::now()),
                        note: Some(text),
                        ..PaymentPatch::default()
                    },
                };
                match self.apply(&record, update).await? {
                    Some(updated) => {
                        self.announce(&updated);
                        Ok(updated)
                    }
                    None => {
                        let current = self.get(record.id).await?;
                        if current.status == PaymentStatus::Completed {
                            return Ok(current);
                        }
                        error!(
                            payment_id = %current.id,
                            current = %current.status,
                            "Manual confirmation raced with another status change"
                        );
                        Err(PaymentError::InvalidTransition {
                            current: current.status,
                            requested: PaymentStatus::Completed,
                        })
                    }
                }
            }
            current => {
                error!(
                    payment_id = %record.id,
                    current = %current,
                    "Manual confirmation of a payment that cannot complete"
                );
                Err(PaymentError::InvalidTransition {
                    current,
                    requested: PaymentStatus::Completed,
                })
            }
        }
    }

    /// Records an accepted ledger match. Idempotent: a record that is no
    /// longer `PENDING` is left as it is.
    pub async fn apply_ledger_match(
        &self,
        record: &PaymentRecord,
        transaction: &LedgerTransaction,
    ) -> PaymentResult<Option<PaymentRecord>> {
        let update = GuardedUpdate {
            expected: PaymentStatus::Pending,
            version: None,
            patch: PaymentPatch {
                status: Some(PaymentStatus::Completed),
                external_transaction_id: Some(transaction.transaction_id.clone()),
                paid_at: Some(Utc::now()),
                note: Some(format!(
                    "Payment confirmed: source=bank-reconciliation, transaction {}, matched transaction time {}",
                    transaction.transaction_id,
                    transaction.timestamp.to_rfc3339()
                )),
                ..PaymentPatch::default()
            },
        };
        let updated = self.apply(record, update).await?;
        if let Some(updated) = &updated {
            self.announce(updated);
        }
        Ok(updated)
    }

    /// Moves a lapsed QR payment to `EXPIRED` unless something else got there first.
    pub async fn expire(&self, record: &PaymentRecord) -> PaymentResult<Option<PaymentRecord>> {
        let expired_at = record
            .qr_expires_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        // A regeneration after the sweep read bumps the version and wins.
        let update = GuardedUpdate::new(
            PaymentStatus::Pending,
            PaymentPatch::to_status(PaymentStatus::Expired).with_note(format!(
                "QR payment expired at {} without a matching bank transfer",
                expired_at
            )),
        )
        .at_version(record.version);
        let updated = self.apply(record, update).await?;
        if let Some(updated) = &updated {
            self.announce(updated);
        }
        Ok(updated)
    }

    /// Appends an audit note without touching status.
    pub async fn note(&self, id: Uuid, note: &str) -> PaymentResult<Option<PaymentRecord>> {
        let updated = self.payments.append_note(id, note).await?;
        if updated.is_none() {
            warn!(payment_id = %id, "Could not append note, payment not found");
        }
        Ok(updated)
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn announce(&self, record: &PaymentRecord) {
        let event = match record.status {
            PaymentStatus::Completed => NotificationEvent::PaymentConfirmed {
                payment_id: record.id,
                owner_id: record.owner_id.clone(),
                amount: record.amount.to_string(),
                method: record.method.to_string(),
            },
            PaymentStatus::Failed => NotificationEvent::PaymentFailed {
                payment_id: record.id,
                owner_id: record.owner_id.clone(),
                reason: record.failure_reason.clone().unwrap_or_default(),
            },
            PaymentStatus::Expired => NotificationEvent::PaymentExpired {
                payment_id: record.id,
                owner_id: record.owner_id.clone(),
                qr_reference: record.qr_reference.clone(),
            },
            _ => return,
        };
        self.notifier.notify(event);
    }
}
