use super::AppState;
use crate::health::HealthStatus;
use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info};

pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = state.health.check_health().await;
    if health_status.is_healthy() {
        Ok(Json(health_status))
    } else {
        error!("❌ Health check failed - service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    }
}

pub async fn liveness() -> &'static str {
    info!("💓 Liveness probe requested");
    "OK"
}
