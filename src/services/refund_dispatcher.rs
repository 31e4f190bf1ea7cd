use crate::payments::error::PaymentResult;
use crate::payments::strategy::RefundPlan;
use crate::payments::types::{PaymentMethod, PaymentRecord, PaymentStatus};
use crate::services::notification::NotificationEvent;
use crate::services::payment_service::PaymentService;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "payment", rename_all = "snake_case")]
pub enum RefundOutcome {
    /// Nothing was collected online (COD), or the payment never completed.
    NotEligible,
    AlreadyRefunded,
    Refunded(PaymentRecord),
    /// Marked `REFUNDED` for bookkeeping; staff still have to send the money.
    ManualTransferRequired(PaymentRecord),
    /// Payment stays `COMPLETED` with a note for manual follow-up.
    Failed { reason: String },
}

impl RefundOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefundOutcome::NotEligible => "not_eligible",
            RefundOutcome::AlreadyRefunded => "already_refunded",
            RefundOutcome::Refunded(_) => "refunded",
            RefundOutcome::ManualTransferRequired(_) => "manual_transfer_required",
            RefundOutcome::Failed { .. } => "failed",
        }
    }
}

/// Method-aware refunds triggered by booking cancellation.
#[derive(Clone)]
pub struct RefundDispatcher {
    payments: PaymentService,
}

impl RefundDispatcher {
    pub fn new(payments: PaymentService) -> Self {
        Self { payments }
    }

    /// Never fails because the refund failed; only storage errors propagate.
    pub async fn dispatch(&self, record: &PaymentRecord, reason: &str) -> PaymentResult<RefundOutcome> {
        // Callers may hold a stale snapshot.
        let record = &self.payments.get(record.id).await?;
        match record.status {
            PaymentStatus::Refunded => {
                debug!(payment_id = %record.id, "Payment already refunded");
                return Ok(RefundOutcome::AlreadyRefunded);
            }
            PaymentStatus::Completed => {}
            status => {
                debug!(payment_id = %record.id, status = %status, "Payment not eligible for refund");
                return Ok(RefundOutcome::NotEligible);
            }
        }

        let strategy = self.payments.strategies().get_strategy(record.method);
        match strategy.refund(record, reason).await {
            RefundPlan::NotEligible => {
                debug!(payment_id = %record.id, method = %record.method, "Refund not applicable");
                Ok(RefundOutcome::NotEligible)
            }
            RefundPlan::Apply(update) => match self.payments.apply(record, update).await? {
                Some(updated) => {
                    info!(
                        payment_id = %updated.id,
                        method = %updated.method,
                        refund_amount = ?updated.refund_amount.as_ref().map(|a| a.to_string()),
                        "Refund recorded"
                    );
                    if updated.method == PaymentMethod::Qr {
                        self.payments.notifier().notify(NotificationEvent::ManualRefundRequired {
                            payment_id: updated.id,
                            owner_id: updated.owner_id.clone(),
                            amount: updated.amount.to_string(),
                            qr_reference: updated.qr_reference.clone(),
                        });
                        Ok(RefundOutcome::ManualTransferRequired(updated))
                    } else {
                        Ok(RefundOutcome::Refunded(updated))
                    }
                }
                None => {
                    let current = self.payments.get(record.id).await?;
                    if current.status == PaymentStatus::Refunded {
                        Ok(RefundOutcome::AlreadyRefunded)
                    } else {
                        Ok(RefundOutcome::NotEligible)
                    }
                }
            },
            RefundPlan::Failed { reason: failure } => {
                warn!(
                    payment_id = %record.id,
                    method = %record.method,
                    error = %failure,
                    "Refund failed, manual follow-up required"
                );
                self.payments
                    .note(
                        record.id,
                        &format!(
                            "Refund attempt failed: {} | Cancellation reason: {} | Requires manual follow-up",
                            failure, reason
                        ),
                    )
                    .await?;
                Ok(RefundOutcome::Failed { reason: failure })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MerchantConfig, PaymentsConfig};
    use crate::database::memory::InMemoryStore;
    use crate::payments::factory::PaymentStrategies;
    use crate::payments::providers::SandboxCardGateway;
    use crate::payments::types::{MethodParams, PaymentRequest};
    use crate::services::notification::{LoggingNotificationDispatcher, Notifier};
    use bigdecimal::BigDecimal;
    use std::sync::Arc;

    fn dispatcher() -> (PaymentService, RefundDispatcher) {
        let payments = PaymentService::new(
            Arc::new(InMemoryStore::new()),
            PaymentStrategies::with_config(&PaymentsConfig::default(), Arc::new(SandboxCardGateway)),
            MerchantConfig::default(),
            Notifier::new(Arc::new(LoggingNotificationDispatcher)),
        );
        (payments.clone(), RefundDispatcher::new(payments))
    }

    fn request(params: MethodParams) -> PaymentRequest {
        PaymentRequest {
            owner_id: "cust-1".to_string(),
            service_ref: "STI-BASIC".to_string(),
            amount: BigDecimal::from(500_000),
            params,
        }
    }

    #[tokio::test]
    async fn cod_is_not_refunded() {
        let (payments, refunds) = dispatcher();
        let record = payments.initiate(request(MethodParams::Cod)).await.unwrap().record;
        assert_eq!(
            refunds.dispatch(&record, "canceled").await.unwrap(),
            RefundOutcome::NotEligible
        );
        assert_eq!(
            payments.get(record.id).await.unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn qr_refund_needs_manual_transfer_and_is_applied_once() {
        let (payments, refunds) = dispatcher();
        let record = payments.initiate(request(MethodParams::Qr)).await.unwrap().record;
        let record = payments
            .manual_confirm_qr(record.qr_reference.as_deref().unwrap(), "staff-1", None, None)
            .await
            .unwrap();

        let outcome = refunds.dispatch(&record, "customer canceled").await.unwrap();
        let RefundOutcome::ManualTransferRequired(refunded) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(refunded.refund_amount, Some(record.amount.clone()));

        // Stale copy still says COMPLETED; the guarded write must not land twice.
        let again = refunds.dispatch(&record, "customer canceled").await.unwrap();
        assert_eq!(again, RefundOutcome::AlreadyRefunded);
        let stored = payments.get(record.id).await.unwrap();
        assert_eq!(stored.version, refunded.version);
    }
}
