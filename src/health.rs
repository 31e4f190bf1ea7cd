//! Health check module
//! Reports the state of the payment store the engine is running against.

use serde::Serialize;
use std::collections::HashMap;
#[cfg(feature = "database")]
use std::time::{Duration, Instant};
#[cfg(feature = "database")]
use tokio::time::timeout;
#[cfg(feature = "database")]
use tracing::{error, info};

#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Clone, Default)]
pub struct HealthChecker {
    #[cfg(feature = "database")]
    db_pool: Option<sqlx::PgPool>,
}

impl HealthChecker {
    /// Checker for a process running on the in-memory store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[cfg(feature = "database")]
    pub fn with_database(db_pool: sqlx::PgPool) -> Self {
        Self {
            db_pool: Some(db_pool),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        #[cfg(feature = "database")]
        if let Some(pool) = &self.db_pool {
            let component = match timeout(Duration::from_secs(5), check_database_health(pool)).await {
                Ok(Ok(response_time)) => {
                    info!("Database health check: OK ({}ms)", response_time);
                    ComponentHealth::up(Some(response_time))
                }
                Ok(Err(e)) => {
                    error!("Database health check failed: {}", e);
                    ComponentHealth::down(Some(e.to_string()))
                }
                Err(_) => {
                    error!("Database health check timed out");
                    ComponentHealth::down(Some("Timeout".to_string()))
                }
            };
            if component.status == ComponentState::Down {
                health_status.status = HealthState::Unhealthy;
            }
            health_status.checks.insert("database".to_string(), component);
            return health_status;
        }

        health_status.checks.insert(
            "storage".to_string(),
            ComponentHealth::up(None).with_details("in-memory"),
        );
        health_status
    }
}

#[cfg(feature = "database")]
pub async fn check_database_health(
    pool: &sqlx::PgPool,
) -> Result<u128, Box<dyn std::error::Error + Send + Sync>> {
    let start = Instant::now();
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => Ok(start.elapsed().as_millis()),
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_is_always_up() {
        let status = HealthChecker::in_memory().check_health().await;
        assert!(status.is_healthy());
        assert_eq!(status.checks["storage"].status, ComponentState::Up);
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert_eq!(up_health.status, ComponentState::Up);
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert_eq!(down_health.status, ComponentState::Down);
        assert_eq!(down_health.details, Some("Test error".to_string()));
    }
}
