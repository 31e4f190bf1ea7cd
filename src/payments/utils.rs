use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Single-attempt HTTP client for payment collaborators.
///
/// Failed calls are never retried inline; the next poll cycle or a fresh
/// user attempt is the retry.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    service: &'static str,
}

impl PaymentHttpClient {
    pub fn new(service: &'static str, timeout: Duration) -> PaymentResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            PaymentError::ExternalService {
                service: service.to_string(),
                message: format!("failed to initialize HTTP client: {}", e),
                retryable: false,
            }
        })?;

        Ok(Self {
            client,
            timeout,
            service,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let mut request = self.client.request(method, url).timeout(self.timeout);

        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        for (k, v) in additional_headers {
            request = request.header(*k, *v);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::Timeout {
                    service: self.service.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                PaymentError::ExternalService {
                    service: self.service.to_string(),
                    message: format!("request failed: {}", e),
                    retryable: true,
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() || status.is_client_error() {
            // Gateways report declines as 4xx with a JSON error body.
            return serde_json::from_str::<T>(&text).map_err(|e| {
                warn!(service = self.service, status = %status, "unparseable response body");
                PaymentError::ExternalService {
                    service: self.service.to_string(),
                    message: format!("HTTP {}: invalid response body: {}", status, e),
                    retryable: false,
                }
            });
        }

        Err(PaymentError::ExternalService {
            service: self.service.to_string(),
            message: format!("HTTP {}: {}", status, text),
            retryable: status.is_server_error() || status.as_u16() == 429,
        })
    }
}

/// Bounds an external call. Collaborator implementations may carry their own
/// timeouts; this one holds regardless of how the collaborator is built.
pub async fn with_timeout<T, F>(service: &str, timeout: Duration, call: F) -> PaymentResult<T>
where
    F: Future<Output = PaymentResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(PaymentError::Timeout {
            service: service.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let result: PaymentResult<()> = with_timeout("bank ledger", Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(PaymentError::Timeout { timeout_secs: 2, .. })));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result = with_timeout("card gateway", Duration::from_secs(2), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
