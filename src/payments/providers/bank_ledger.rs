use crate::config::BankLedgerConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{BankLedgerClient, LedgerLookup, LedgerTransaction};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "bank ledger";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionCheckResponse {
    #[serde(default)]
    transaction_found: bool,
    transaction_id: Option<String>,
    amount: Option<BigDecimal>,
    reference: Option<String>,
    transaction_date: Option<String>,
    status: Option<String>,
}

/// Bank transaction-history API client (credit lookups by reference).
pub struct HttpBankLedger {
    config: BankLedgerConfig,
    http: PaymentHttpClient,
    /// How far back each lookup searches; matches the QR lifetime.
    lookback: ChronoDuration,
}

impl HttpBankLedger {
    pub fn new(
        config: BankLedgerConfig,
        timeout: Duration,
        lookback: ChronoDuration,
    ) -> PaymentResult<Self> {
        if config.api_key.is_none() {
            return Err(PaymentError::Validation {
                message: "BANK_LEDGER_API_KEY environment variable is required".to_string(),
                field: Some("BANK_LEDGER_API_KEY".to_string()),
            });
        }
        let http = PaymentHttpClient::new(SERVICE, timeout)?;
        Ok(Self {
            config,
            http,
            lookback,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// The bank reports local timestamps without an offset; RFC 3339 is taken as is.
fn parse_bank_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn into_lookup(response: TransactionCheckResponse) -> LedgerLookup {
    if !response.transaction_found {
        return LedgerLookup::NotFound;
    }
    match (response.transaction_id, response.amount, response.reference) {
        (Some(transaction_id), Some(amount), Some(reference)) => {
            LedgerLookup::Found(LedgerTransaction {
                transaction_id,
                amount,
                reference,
                timestamp: response
                    .transaction_date
                    .as_deref()
                    .and_then(parse_bank_timestamp)
                    .unwrap_or_else(Utc::now),
                successful: response.status.as_deref() == Some("SUCCESS"),
            })
        }
        _ => LedgerLookup::NotFound,
    }
}

#[async_trait]
impl BankLedgerClient for HttpBankLedger {
    async fn find_transaction(
        &self,
        reference: &str,
        expected_amount: &BigDecimal,
    ) -> PaymentResult<LedgerLookup> {
        let now = Utc::now();
        let payload = serde_json::json!({
            "accountNumber": self.config.account_number,
            "fromDate": (now - self.lookback).format("%Y-%m-%dT%H:%M:%S").to_string(),
            "toDate": now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "reference": reference,
            "amount": expected_amount.to_string(),
            "transactionType": "CREDIT",
        });

        let response: TransactionCheckResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/api/transaction-history/check"),
                self.config.api_key.as_deref(),
                Some(&payload),
                &[
                    ("X-Device-ID", self.config.device_id.as_str()),
                    ("X-Account-Number", self.config.account_number.as_str()),
                ],
            )
            .await?;

        debug!(
            qr_reference = reference,
            found = response.transaction_found,
            "bank ledger lookup finished"
        );
        Ok(into_lookup(response))
    }

    fn name(&self) -> &'static str {
        SERVICE
    }
}
