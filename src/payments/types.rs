use crate::logging::mask_card_number;
use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cod,
    Card,
    Qr,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Qr => "QR",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "COD" | "CASH" => Ok(PaymentMethod::Cod),
            "CARD" | "VISA" => Ok(PaymentMethod::Card),
            "QR" | "QR_CODE" => Ok(PaymentMethod::Qr),
            _ => Err(PaymentError::Validation {
                message: format!("unsupported payment method: {}", value),
                field: Some("method".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Expired,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| PaymentError::Validation {
                message: format!("unknown payment status: {}", value),
                field: Some("status".to_string()),
            })
    }
}

/// Durable payment entity. Never deleted; `notes` is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub service_ref: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub external_transaction_id: Option<String>,
    pub qr_reference: Option<String>,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<BigDecimal>,
    pub notes: Vec<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn new(
        owner_id: impl Into<String>,
        service_ref: impl Into<String>,
        method: PaymentMethod,
        status: PaymentStatus,
        amount: BigDecimal,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            service_ref: service_ref.into(),
            method,
            status,
            amount,
            currency: currency.into(),
            external_transaction_id: None,
            qr_reference: None,
            qr_expires_at: None,
            failure_reason: None,
            refund_id: None,
            refund_amount: None,
            notes: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            paid_at: None,
            refunded_at: None,
        }
    }

    pub fn is_qr_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.qr_expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Field changes applied by a conditional status write.
///
/// `None` leaves the stored value untouched; `note` is appended, never replaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentPatch {
    pub status: Option<PaymentStatus>,
    pub external_transaction_id: Option<String>,
    pub qr_reference: Option<String>,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<BigDecimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl PaymentPatch {
    pub fn to_status(status: PaymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn apply_to(&self, record: &mut PaymentRecord, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(v) = &self.external_transaction_id {
            record.external_transaction_id = Some(v.clone());
        }
        if let Some(v) = &self.qr_reference {
            record.qr_reference = Some(v.clone());
        }
        if let Some(v) = self.qr_expires_at {
            record.qr_expires_at = Some(v);
        }
        if let Some(v) = &self.failure_reason {
            record.failure_reason = Some(v.clone());
        }
        if let Some(v) = &self.refund_id {
            record.refund_id = Some(v.clone());
        }
        if let Some(v) = &self.refund_amount {
            record.refund_amount = Some(v.clone());
        }
        if let Some(v) = self.paid_at {
            record.paid_at = Some(v);
        }
        if let Some(v) = self.refunded_at {
            record.refunded_at = Some(v);
        }
        if let Some(note) = &self.note {
            record.notes.push(note.clone());
        }
        record.version += 1;
        record.updated_at = now;
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
    pub holder_name: Option<String>,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &mask_card_number(&self.number))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("cvc", &"***")
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

impl CardDetails {
    pub fn validate(&self) -> Result<(), PaymentError> {
        let digits = self.number.chars().filter(|c| c.is_ascii_digit()).count();
        if !(12..=19).contains(&digits) {
            return Err(PaymentError::Validation {
                message: "card number must contain 12 to 19 digits".to_string(),
                field: Some("card.number".to_string()),
            });
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err(PaymentError::Validation {
                message: "expiry month must be between 1 and 12".to_string(),
                field: Some("card.exp_month".to_string()),
            });
        }
        if self.cvc.len() < 3 || self.cvc.len() > 4 || !self.cvc.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PaymentError::Validation {
                message: "cvc must be 3 or 4 digits".to_string(),
                field: Some("card.cvc".to_string()),
            });
        }
        Ok(())
    }
}

/// Method-specific inputs for initiating a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MethodParams {
    Cod,
    Card { card: CardDetails },
    Qr,
}

impl MethodParams {
    pub fn method(&self) -> PaymentMethod {
        match self {
            MethodParams::Cod => PaymentMethod::Cod,
            MethodParams::Card { .. } => PaymentMethod::Card,
            MethodParams::Qr => PaymentMethod::Qr,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub owner_id: String,
    pub service_ref: String,
    pub amount: BigDecimal,
    pub params: MethodParams,
}

impl PaymentRequest {
    /// Runs before any state is created.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.owner_id.trim().is_empty() {
            return Err(PaymentError::Validation {
                message: "owner_id is required".to_string(),
                field: Some("owner_id".to_string()),
            });
        }
        if self.service_ref.trim().is_empty() {
            return Err(PaymentError::Validation {
                message: "service_ref is required".to_string(),
                field: Some("service_ref".to_string()),
            });
        }
        if self.amount <= BigDecimal::from(0) {
            return Err(PaymentError::Validation {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if let MethodParams::Card { card } = &self.params {
            card.validate()?;
        }
        Ok(())
    }
}

/// Renderable bank-transfer instructions for a QR payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentInstructions {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reference: String,
    pub qr_image_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of initiating a payment: the stored record plus QR instructions when applicable.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub record: PaymentRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<PaymentInstructions>,
}
