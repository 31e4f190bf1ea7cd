use crate::config::CatalogConfig;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;

/// Read-only price lookup, consulted once when a booking is created.
#[async_trait]
pub trait BookingCatalog: Send + Sync {
    async fn price_of(&self, service_ref: &str) -> Option<BigDecimal>;
}

/// Prices loaded from configuration at start-up.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    prices: HashMap<String, BigDecimal>,
}

impl StaticCatalog {
    pub fn new(prices: HashMap<String, BigDecimal>) -> Self {
        Self { prices }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.prices.clone())
    }

    pub fn with_price(mut self, service_ref: impl Into<String>, price: BigDecimal) -> Self {
        self.prices.insert(service_ref.into(), price);
        self
    }
}

#[async_trait]
impl BookingCatalog for StaticCatalog {
    async fn price_of(&self, service_ref: &str) -> Option<BigDecimal> {
        self.prices.get(service_ref.trim()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_service_has_price() {
        let catalog = StaticCatalog::default().with_price("STI-BASIC", BigDecimal::from(300_000));
        assert_eq!(
            catalog.price_of("STI-BASIC").await,
            Some(BigDecimal::from(300_000))
        );
        assert_eq!(catalog.price_of("UNKNOWN").await, None);
    }
}
