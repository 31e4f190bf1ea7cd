use crate::config::CardGatewayConfig;
use crate::logging::mask_card_number;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{CardGatewayClient, ChargeOutcome, RefundResult};
use crate::payments::types::CardDetails;
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const SERVICE: &str = "card gateway";

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    message: Option<String>,
    decline_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: Option<String>,
    status: Option<String>,
    failure_message: Option<String>,
    error: Option<GatewayErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: Option<String>,
    status: Option<String>,
    failure_reason: Option<String>,
    error: Option<GatewayErrorBody>,
}

/// JSON card gateway speaking a charges/refunds API.
pub struct HttpCardGateway {
    config: CardGatewayConfig,
    http: PaymentHttpClient,
}

impl HttpCardGateway {
    pub fn new(config: CardGatewayConfig, timeout: Duration) -> PaymentResult<Self> {
        if config.secret_key.is_none() {
            return Err(PaymentError::Validation {
                message: "CARD_GATEWAY_SECRET_KEY environment variable is required".to_string(),
                field: Some("CARD_GATEWAY_SECRET_KEY".to_string()),
            });
        }
        let http = PaymentHttpClient::new(SERVICE, timeout)?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn decline_reason(
        failure_message: Option<String>,
        error: Option<GatewayErrorBody>,
    ) -> String {
        failure_message
            .or_else(|| {
                error.map(|e| match (e.message, e.decline_code) {
                    (Some(m), _) => m,
                    (None, Some(code)) => code,
                    (None, None) => "declined".to_string(),
                })
            })
            .unwrap_or_else(|| "declined".to_string())
    }
}

#[async_trait]
impl CardGatewayClient for HttpCardGateway {
    async fn charge(
        &self,
        amount: &BigDecimal,
        currency: &str,
        card: &CardDetails,
        idempotency_key: &str,
    ) -> PaymentResult<ChargeOutcome> {
        info!(
            card = %mask_card_number(&card.number),
            amount = %amount,
            currency = currency,
            "submitting card charge"
        );

        let payload = serde_json::json!({
            "amount": amount.to_string(),
            "currency": currency.to_lowercase(),
            "card": {
                "number": card.number,
                "exp_month": card.exp_month,
                "exp_year": card.exp_year,
                "cvc": card.cvc,
                "name": card.holder_name,
            },
        });

        let response: ChargeResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/charges"),
                self.config.secret_key.as_deref(),
                Some(&payload),
                &[("Idempotency-Key", idempotency_key)],
            )
            .await?;

        match (response.status.as_deref(), response.id) {
            (Some("succeeded"), Some(id)) => Ok(ChargeOutcome::Approved { transaction_id: id }),
            (Some("succeeded"), None) => Err(PaymentError::ExternalService {
                service: SERVICE.to_string(),
                message: "charge succeeded without a transaction id".to_string(),
                retryable: false,
            }),
            _ => Ok(ChargeOutcome::Declined {
                reason: Self::decline_reason(response.failure_message, response.error),
            }),
        }
    }

    async fn refund(&self, transaction_id: &str) -> PaymentResult<RefundResult> {
        let payload = serde_json::json!({ "charge": transaction_id });
        let response: RefundResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/refunds"),
                self.config.secret_key.as_deref(),
                Some(&payload),
                &[],
            )
            .await?;

        match (response.status.as_deref(), response.id) {
            (Some("succeeded") | Some("pending"), Some(id)) => {
                Ok(RefundResult::Refunded { refund_id: id })
            }
            _ => Ok(RefundResult::Rejected {
                reason: Self::decline_reason(response.failure_reason, response.error),
            }),
        }
    }

    fn name(&self) -> &'static str {
        SERVICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secret_key_is_rejected() {
        let config = CardGatewayConfig {
            base_url: "https://gateway.test".to_string(),
            secret_key: None,
        };
        assert!(HttpCardGateway::new(config, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn decline_reason_prefers_failure_message() {
        let reason = HttpCardGateway::decline_reason(
            Some("Your card has insufficient funds.".to_string()),
            Some(GatewayErrorBody {
                message: Some("ignored".to_string()),
                decline_code: None,
            }),
        );
        assert_eq!(reason, "Your card has insufficient funds.");
    }

    #[test]
    fn decline_reason_falls_back_to_error_body() {
        let reason = HttpCardGateway::decline_reason(
            None,
            Some(GatewayErrorBody {
                message: None,
                decline_code: Some("card_declined".to_string()),
            }),
        );
        assert_eq!(reason, "card_declined");
    }
}
