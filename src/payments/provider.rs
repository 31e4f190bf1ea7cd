//! Contracts for the external payment collaborators.
//!
//! Both sides are black boxes: the card gateway charges and refunds, the bank
//! ledger answers whether a transfer with a given reference has arrived.

use crate::payments::error::PaymentResult;
use crate::payments::types::CardDetails;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundResult {
    Refunded { refund_id: String },
    Rejected { reason: String },
}

/// A credit transaction as reported by the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
    pub successful: bool,
}

impl LedgerTransaction {
    /// Exact amount and reference match only. The bank upper-cases and pads
    /// transfer descriptions, so the reference compare ignores case and
    /// surrounding whitespace.
    pub fn matches(&self, reference: &str, expected_amount: &BigDecimal) -> bool {
        self.successful
            && self.amount > BigDecimal::from(0)
            && &self.amount == expected_amount
            && self.reference.trim().eq_ignore_ascii_case(reference.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerLookup {
    Found(LedgerTransaction),
    NotFound,
}

#[async_trait]
pub trait CardGatewayClient: Send + Sync {
    /// A decline is an `Ok` outcome; `Err` means the gateway could not be reached
    /// or answered with something unusable.
    async fn charge(
        &self,
        amount: &BigDecimal,
        currency: &str,
        card: &CardDetails,
        idempotency_key: &str,
    ) -> PaymentResult<ChargeOutcome>;

    async fn refund(&self, transaction_id: &str) -> PaymentResult<RefundResult>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait BankLedgerClient: Send + Sync {
    async fn find_transaction(
        &self,
        reference: &str,
        expected_amount: &BigDecimal,
    ) -> PaymentResult<LedgerLookup>;

    fn name(&self) -> &'static str;
}
