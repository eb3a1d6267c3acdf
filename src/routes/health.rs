//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the process serving?)
//! - /ready, /readyz - readiness (can the database answer a query?)
//! - /version - build information for deployment checks

use hyper::StatusCode;
use serde::Serialize;
use tracing::warn;

use crate::server::AppState;
use crate::services::response::{json_response, JsonResponse};

/// Health response shared by the liveness and readiness probes
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// `online` or `degraded`
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    /// `development` or `production`
    pub mode: &'static str,
    pub database: DatabaseHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let (connected, error) = match state.db.ping() {
        Ok(()) => (true, None),
        Err(e) => {
            warn!("Database ping failed: {}", e);
            (false, Some("Database unavailable".to_string()))
        }
    };

    HealthResponse {
        healthy: connected,
        status: if connected { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        database: DatabaseHealth { connected },
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
///
/// Always 200 while the process runs; the body still reports the database.
pub fn health_check(state: &AppState) -> JsonResponse {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// Handle readiness probe (/ready, /readyz)
pub fn readiness_check(state: &AppState) -> JsonResponse {
    let response = build_health_response(state);
    let status = if response.database.connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> JsonResponse {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: env!("CARGO_PKG_NAME"),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_state;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_health_and_ready() {
        let state = test_state();
        assert_eq!(health_check(&state).status(), StatusCode::OK);

        let resp = readiness_check(&state);
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["database"]["connected"], true);
        assert_eq!(body["mode"], "development");
    }

    #[tokio::test]
    async fn test_version_info() {
        let bytes = version_info().into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["service"], "treatment-tracker");
    }
}
