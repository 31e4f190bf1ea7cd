//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use bigdecimal::BigDecimal;
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running with `SKIP_EXTERNALS=true` against the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub payments: PaymentsConfig,
    pub merchant: MerchantConfig,
    pub card_gateway: CardGatewayConfig,
    pub bank_ledger: BankLedgerConfig,
    pub catalog: CatalogConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration. Unset fields fall back to the environment's defaults.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment lifecycle timings and currency
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub qr_expiry_hours: i64,
    pub cancellation_lead_time_hours: i64,
    pub currency: String,
    pub external_call_timeout_secs: u64,
}

/// Static merchant account shown on QR payment instructions
#[derive(Debug, Clone)]
pub struct MerchantConfig {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub qr_base_url: String,
}

#[derive(Debug, Clone)]
pub struct CardGatewayConfig {
    pub base_url: String,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BankLedgerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub device_id: String,
    pub account_number: String,
}

/// Service prices, keyed by service reference
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    pub prices: HashMap<String, BigDecimal>,
}

/// `SKIP_EXTERNALS=true` runs without Postgres or live payment collaborators.
pub fn skip_externals() -> bool {
    env::var("SKIP_EXTERNALS")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let database = if skip_externals() {
            None
        } else {
            Some(DatabaseConfig::from_env()?)
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            logging: LoggingConfig::from_env()?,
            payments: PaymentsConfig::from_env()?,
            merchant: MerchantConfig::from_env(),
            card_gateway: CardGatewayConfig::from_env(),
            bank_ledger: BankLedgerConfig::from_env(),
            catalog: CatalogConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.payments.validate()?;
        self.merchant.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").ok().filter(|v| !v.trim().is_empty()),
            format: env::var("LOG_FORMAT").ok().map(|f| match f.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            }),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if let Some(level) = &self.level {
            if !valid_levels.contains(&level.trim().to_uppercase().as_str()) {
                return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
            }
        }

        Ok(())
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            qr_expiry_hours: 24,
            cancellation_lead_time_hours: 24,
            currency: "VND".to_string(),
            external_call_timeout_secs: 15,
        }
    }
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(PaymentsConfig {
            qr_expiry_hours: parse_or("QR_EXPIRY_HOURS", defaults.qr_expiry_hours)?,
            cancellation_lead_time_hours: parse_or(
                "CANCELLATION_LEAD_TIME_HOURS",
                defaults.cancellation_lead_time_hours,
            )?,
            currency: env::var("PAYMENT_CURRENCY").unwrap_or(defaults.currency),
            external_call_timeout_secs: parse_or(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                defaults.external_call_timeout_secs,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.qr_expiry_hours <= 0 {
            return Err(ConfigError::InvalidValue(
                "QR_EXPIRY_HOURS must be positive".to_string(),
            ));
        }

        if self.cancellation_lead_time_hours < 0 {
            return Err(ConfigError::InvalidValue(
                "CANCELLATION_LEAD_TIME_HOURS cannot be negative".to_string(),
            ));
        }

        if self.external_call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "EXTERNAL_CALL_TIMEOUT_SECS".to_string(),
            ));
        }

        if self.currency.trim().is_empty() {
            return Err(ConfigError::InvalidValue("PAYMENT_CURRENCY".to_string()));
        }

        Ok(())
    }

    pub fn qr_ttl(&self) -> ChronoDuration {
        ChronoDuration::hours(self.qr_expiry_hours)
    }

    pub fn cancellation_lead_time(&self) -> ChronoDuration {
        ChronoDuration::hours(self.cancellation_lead_time_hours)
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            bank_code: "970422".to_string(),
            account_number: "0349079940".to_string(),
            account_name: "HEALAPP CLINIC".to_string(),
            qr_base_url: "https://img.vietqr.io/image".to_string(),
        }
    }
}

impl MerchantConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        MerchantConfig {
            bank_code: env::var("MERCHANT_BANK_CODE").unwrap_or(defaults.bank_code),
            account_number: env::var("MERCHANT_ACCOUNT_NUMBER")
                .unwrap_or(defaults.account_number),
            account_name: env::var("MERCHANT_ACCOUNT_NAME").unwrap_or(defaults.account_name),
            qr_base_url: env::var("MERCHANT_QR_BASE_URL").unwrap_or(defaults.qr_base_url),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bank_code.is_empty() || self.account_number.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "merchant bank code and account number are required".to_string(),
            ));
        }

        if !self.qr_base_url.starts_with("http://") && !self.qr_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(
                "MERCHANT_QR_BASE_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl CardGatewayConfig {
    pub fn from_env() -> Self {
        CardGatewayConfig {
            base_url: env::var("CARD_GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            secret_key: env::var("CARD_GATEWAY_SECRET_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

impl BankLedgerConfig {
    pub fn from_env() -> Self {
        BankLedgerConfig {
            base_url: env::var("BANK_LEDGER_BASE_URL")
                .unwrap_or_else(|_| "https://api.mbbank.com.vn".to_string()),
            api_key: env::var("BANK_LEDGER_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            device_id: env::var("BANK_LEDGER_DEVICE_ID")
                .unwrap_or_else(|_| "clinic-device-001".to_string()),
            account_number: env::var("MERCHANT_ACCOUNT_NUMBER")
                .unwrap_or_else(|_| MerchantConfig::default().account_number),
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("SERVICE_PRICES") {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Parses `ref=price,ref=price`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut prices = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (service_ref, price) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidValue(format!("SERVICE_PRICES entry '{}'", entry)))?;
            let price = BigDecimal::from_str(price.trim())
                .map_err(|_| ConfigError::InvalidValue(format!("SERVICE_PRICES price '{}'", price)))?;
            prices.insert(service_ref.trim().to_string(), price);
        }
        Ok(Self { prices })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_payments_defaults_match_business_rules() {
        let config = PaymentsConfig::default();
        assert_eq!(config.qr_ttl(), ChronoDuration::hours(24));
        assert_eq!(config.cancellation_lead_time(), ChronoDuration::hours(24));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_qr_expiry_rejected() {
        let config = PaymentsConfig {
            qr_expiry_hours: 0,
            ..PaymentsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_catalog_prices_parse() {
        let catalog = CatalogConfig::parse("STI-BASIC=300000, STI-FULL = 500000").unwrap();
        assert_eq!(catalog.prices.len(), 2);
        assert_eq!(
            catalog.prices.get("STI-FULL"),
            Some(&BigDecimal::from(500_000))
        );
    }

    #[test]
    fn test_catalog_rejects_malformed_entry() {
        assert!(CatalogConfig::parse("STI-BASIC").is_err());
        assert!(CatalogConfig::parse("STI-BASIC=abc").is_err());
    }
}
