//! Logging and tracing configuration
//!
//! Structured JSON logs in production, human-readable output in development.
//! Card data never reaches a log line unmasked.

use crate::config::{LogFormat, LoggingConfig};
use std::env;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment types for logging configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Detect environment from ENV variable
    pub fn from_env() -> Self {
        Self::parse(
            &env::var("ENVIRONMENT")
                .or_else(|_| env::var("ENV"))
                .unwrap_or_else(|_| "development".to_string()),
        )
    }

    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn default_log_level(&self) -> Level {
        match self {
            Self::Development => Level::DEBUG,
            Self::Staging => Level::INFO,
            Self::Production => Level::INFO,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Filter used when `RUST_LOG` is unset. `LOG_LEVEL` wins over the
/// environment's default level for this crate.
fn default_directives(config: &LoggingConfig, environment: Environment) -> String {
    let level = config
        .level
        .as_deref()
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_else(|| environment.default_log_level().to_string().to_lowercase());
    format!(
        "{}={},tower_http=debug,axum=info,sqlx=warn,hyper=warn,reqwest=warn",
        env!("CARGO_PKG_NAME").replace('-', "_"),
        level
    )
}

fn uses_json(config: &LoggingConfig, environment: Environment) -> bool {
    match &config.format {
        Some(format) => *format == LogFormat::Json,
        None => environment.is_production(),
    }
}

/// Initialize the tracing subscriber with appropriate formatting
///
/// # Environment Variables
/// - `ENVIRONMENT` or `ENV`: "production", "staging", or "development"
/// - `RUST_LOG`: overrides the filter entirely
///
/// `LOG_LEVEL` and `LOG_FORMAT` arrive through [`LoggingConfig`].
pub fn init_tracing(config: &LoggingConfig) {
    let environment = Environment::from_env();
    let use_json = uses_json(config, environment);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(config, environment)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_target(true)
            .with_level(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(json_layer).init();
    } else {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_target(true)
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(pretty_layer).init();
    }

    tracing::info!(
        environment = ?environment,
        format = if use_json { "json" } else { "pretty" },
        "Tracing initialized"
    );
}

/// Mask a card number for logging, keeping only the last four digits.
pub fn mask_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return "****".to_string();
    }
    let last_four: String = digits[digits.len() - 4..].iter().collect();
    format!("****{}", last_four)
}
