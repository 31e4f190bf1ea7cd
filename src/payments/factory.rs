use crate::config::PaymentsConfig;
use crate::payments::provider::CardGatewayClient;
use crate::payments::strategy::{CardStrategy, CodStrategy, PaymentStrategy, QrStrategy};
use crate::payments::types::PaymentMethod;
use std::sync::Arc;

/// One strategy per payment method, chosen once when a payment is initiated.
#[derive(Clone)]
pub struct PaymentStrategies {
    cod: Arc<CodStrategy>,
    card: Arc<CardStrategy>,
    qr: Arc<QrStrategy>,
}

impl PaymentStrategies {
    pub fn with_config(config: &PaymentsConfig, gateway: Arc<dyn CardGatewayClient>) -> Self {
        Self {
            cod: Arc::new(CodStrategy::new(config.currency.clone())),
            card: Arc::new(CardStrategy::new(
                gateway,
                config.currency.clone(),
                config.external_call_timeout(),
            )),
            qr: Arc::new(QrStrategy::new(config.currency.clone(), config.qr_ttl())),
        }
    }

    pub fn get_strategy(&self, method: PaymentMethod) -> Arc<dyn PaymentStrategy> {
        match method {
            PaymentMethod::Cod => self.cod.clone(),
            PaymentMethod::Card => self.card.clone(),
            PaymentMethod::Qr => self.qr.clone(),
        }
    }

    /// Typed access for QR-only operations such as regeneration.
    pub fn qr(&self) -> &QrStrategy {
        &self.qr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::SandboxCardGateway;

    #[test]
    fn each_method_resolves_to_its_strategy() {
        let strategies =
            PaymentStrategies::with_config(&PaymentsConfig::default(), Arc::new(SandboxCardGateway));
        for method in [PaymentMethod::Cod, PaymentMethod::Card, PaymentMethod::Qr] {
            assert_eq!(strategies.get_strategy(method).method(), method);
        }
        assert_eq!(strategies.qr().ttl(), chrono::Duration::hours(24));
    }
}
