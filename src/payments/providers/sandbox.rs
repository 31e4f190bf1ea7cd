//! Offline collaborators for `SKIP_EXTERNALS` runs.

use crate::payments::error::PaymentResult;
use crate::payments::provider::{
    BankLedgerClient, CardGatewayClient, ChargeOutcome, LedgerLookup, RefundResult,
};
use crate::payments::types::CardDetails;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use uuid::Uuid;

/// Approves every card except the well-known decline test numbers.
#[derive(Debug, Default, Clone)]
pub struct SandboxCardGateway;

const DECLINED_CARDS: &[(&str, &str)] = &[
    ("4000000000000002", "Your card was declined."),
    ("4000000000009995", "Your card has insufficient funds."),
    ("4000000000000069", "Your card has expired."),
];

#[async_trait]
impl CardGatewayClient for SandboxCardGateway {
    async fn charge(
        &self,
        _amount: &BigDecimal,
        _currency: &str,
        card: &CardDetails,
        _idempotency_key: &str,
    ) -> PaymentResult<ChargeOutcome> {
        let number: String = card.number.chars().filter(|c| c.is_ascii_digit()).collect();
        if let Some((_, reason)) = DECLINED_CARDS.iter().find(|(n, _)| *n == number) {
            return Ok(ChargeOutcome::Declined {
                reason: reason.to_string(),
            });
        }
        Ok(ChargeOutcome::Approved {
            transaction_id: format!("ch_sandbox_{}", Uuid::new_v4().simple()),
        })
    }

    async fn refund(&self, _transaction_id: &str) -> PaymentResult<RefundResult> {
        Ok(RefundResult::Refunded {
            refund_id: format!("re_sandbox_{}", Uuid::new_v4().simple()),
        })
    }

    fn name(&self) -> &'static str {
        "sandbox card gateway"
    }
}

/// Never sees a transfer; QR payments settle through manual confirmation.
#[derive(Debug, Default, Clone)]
pub struct OfflineBankLedger;

#[async_trait]
impl BankLedgerClient for OfflineBankLedger {
    async fn find_transaction(
        &self,
        _reference: &str,
        _expected_amount: &BigDecimal,
    ) -> PaymentResult<LedgerLookup> {
        Ok(LedgerLookup::NotFound)
    }

    fn name(&self) -> &'static str {
        "offline bank ledger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> CardDetails {
        CardDetails {
            number: number.to_string(),
            exp_month: 1,
            exp_year: 2030,
            cvc: "123".to_string(),
            holder_name: None,
        }
    }

    #[tokio::test]
    async fn decline_test_card_is_declined() {
        let outcome = SandboxCardGateway
            .charge(&BigDecimal::from(10), "VND", &card("4000 0000 0000 0002"), "k")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ChargeOutcome::Declined {
                reason: "Your card was declined.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn other_cards_are_approved() {
        let outcome = SandboxCardGateway
            .charge(&BigDecimal::from(10), "VND", &card("4242424242424242"), "k")
            .await
            .unwrap();
        assert!(matches!(outcome, ChargeOutcome::Approved { .. }));
    }
}
