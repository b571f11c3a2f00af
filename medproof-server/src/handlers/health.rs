//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, http::StatusCode, Json};
use medproof_core::ComponentStatus;
use serde::Serialize;
use utoipa::ToSchema;

use crate::handlers::AppState;

/// Reachability of one backing service
#[derive(Serialize, ToSchema)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ComponentStatus> for ComponentHealth {
    fn from(status: ComponentStatus) -> Self {
        Self {
            healthy: status.healthy,
            error: status.error,
        }
    }
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    #[schema(example = "healthy")]
    pub status: &'static str,
    /// Server version from Cargo.toml
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
    pub ledger: ComponentHealth,
    pub store: ComponentHealth,
}

/// Service health
///
/// Checks the ledger and the content store concurrently. Always answers
/// 200; `status` is "degraded" when either backend is unreachable.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.service.health().await;
    let status = if report.is_healthy() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "medproof-server",
        ledger: report.ledger.into(),
        store: report.store.into(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether the service is ready to accept traffic
    pub ready: bool,
    /// Optional message explaining status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Readiness check
///
/// 200 when both backends answer, 503 otherwise.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready", body = ReadyResponse),
        (status = 503, description = "A backend is unreachable", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let report = state.service.health().await;
    if report.is_healthy() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        )
    } else {
        let message = if report.ledger.healthy {
            "content store unreachable"
        } else {
            "ledger unreachable"
        };
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(message),
            }),
        )
    }
}
