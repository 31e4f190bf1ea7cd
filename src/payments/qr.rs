//! QR transfer references and the instructions shown to the payer.

use crate::config::MerchantConfig;
use crate::payments::types::{PaymentInstructions, PaymentRecord};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub const REFERENCE_PREFIX: &str = "HEAL";

/// Deterministic for a given (service, owner, millisecond). A collision means
/// the same owner booked the same service in the same millisecond; callers
/// advance the timestamp and try again.
pub fn generate_reference(service_ref: &str, owner_id: &str, timestamp_millis: i64) -> String {
    let mut service_code: String = service_ref
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while service_code.len() < 3 {
        service_code.push('X');
    }

    let digest = Sha256::digest(format!("{}|{}|{}", service_ref, owner_id, timestamp_millis));
    format!(
        "{}{}{}",
        REFERENCE_PREFIX,
        service_code,
        hex::encode_upper(&digest[..6])
    )
}

/// VietQR image link; bank apps pre-fill amount and transfer note from it.
pub fn qr_image_url(merchant: &MerchantConfig, amount: &str, reference: &str) -> String {
    let base = format!(
        "{}/{}-{}-compact.png",
        merchant.qr_base_url.trim_end_matches('/'),
        merchant.bank_code,
        merchant.account_number
    );
    let params = [
        ("amount", amount),
        ("addInfo", reference),
        ("accountName", merchant.account_name.as_str()),
    ];
    match reqwest::Url::parse_with_params(&base, &params) {
        Ok(url) => url.to_string(),
        Err(_) => base,
    }
}

/// Plain digits, no trailing zeros, fractional part kept.
fn transfer_amount(amount: &BigDecimal) -> String {
    if amount.is_integer() {
        amount.with_scale(0).to_string()
    } else {
        amount.normalized().to_string()
    }
}

/// `None` unless the record is a QR payment carrying a reference and expiry.
pub fn build_instructions(
    merchant: &MerchantConfig,
    record: &PaymentRecord,
) -> Option<PaymentInstructions> {
    let reference = record.qr_reference.clone()?;
    let expires_at: DateTime<Utc> = record.qr_expires_at?;
    let amount = transfer_amount(&record.amount);

    Some(PaymentInstructions {
        bank_code: merchant.bank_code.clone(),
        account_number: merchant.account_number.clone(),
        account_name: merchant.account_name.clone(),
        amount: record.amount.clone(),
        currency: record.currency.clone(),
        qr_image_url: qr_image_url(merchant, &amount, &reference),
        reference,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{PaymentMethod, PaymentStatus};

    #[test]
    fn reference_has_expected_shape() {
        let reference = generate_reference("sti-basic", "cust-42", 1_700_000_000_000);
        assert!(reference.starts_with("HEALSTI"));
        assert_eq!(reference.len(), 4 + 3 + 12);
        assert!(reference[7..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn reference_is_deterministic_per_inputs() {
        let a = generate_reference("STI-BASIC", "cust-42", 1);
        assert_eq!(a, generate_reference("STI-BASIC", "cust-42", 1));
        assert_ne!(a, generate_reference("STI-BASIC", "cust-42", 2));
        assert_ne!(a, generate_reference("STI-BASIC", "cust-43", 1));
    }

    #[test]
    fn short_service_codes_are_padded() {
        assert!(generate_reference("a", "o", 1).starts_with("HEALAXX"));
    }

    #[test]
    fn instructions_carry_merchant_account_and_encoded_url() {
        let merchant = MerchantConfig::default();
        let now = Utc::now();
        let mut record = PaymentRecord::new(
            "cust-1",
            "STI-BASIC",
            PaymentMethod::Qr,
            PaymentStatus::Pending,
            BigDecimal::from(300_000),
            "VND",
            now,
        );
        record.qr_reference = Some("HEALSTI0A1B2C3D4E5F6".to_string());
        record.qr_expires_at = Some(now);

        let instructions = build_instructions(&merchant, &record).unwrap();
        assert_eq!(instructions.account_number, "0349079940");
        assert_eq!(instructions.reference, "HEALSTI0A1B2C3D4E5F6");
        assert!(instructions
            .qr_image_url
            .starts_with("https://img.vietqr.io/image/970422-0349079940-compact.png?"));
        assert!(instructions.qr_image_url.contains("amount=300000"));
        assert!(instructions.qr_image_url.contains("addInfo=HEALSTI0A1B2C3D4E5F6"));
        assert!(!instructions.qr_image_url.contains(' '));
    }

    #[test]
    fn fractional_amounts_are_not_truncated_in_the_url() {
        let now = Utc::now();
        let mut record = PaymentRecord::new(
            "cust-1",
            "STI-BASIC",
            PaymentMethod::Qr,
            PaymentStatus::Pending,
            "150000.50".parse::<BigDecimal>().unwrap(),
            "VND",
            now,
        );
        record.qr_reference = Some("HEALSTI0A1B2C3D4E5F6".to_string());
        record.qr_expires_at = Some(now);

        let instructions = build_instructions(&MerchantConfig::default(), &record).unwrap();
        assert!(instructions.qr_image_url.contains("amount=150000.5&"));
        assert_eq!(transfer_amount(&"300000.00".parse::<BigDecimal>().unwrap()), "300000");
    }

    #[test]
    fn card_records_have_no_instructions() {
        let record = PaymentRecord::new(
            "cust-1",
            "STI-BASIC",
            PaymentMethod::Card,
            PaymentStatus::Processing,
            BigDecimal::from(1),
            "VND",
            Utc::now(),
        );
        assert!(build_instructions(&MerchantConfig::default(), &record).is_none());
    }
}
