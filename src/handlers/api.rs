use axum::response::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}
