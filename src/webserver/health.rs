use axum::response::IntoResponse;
use axum::Extension;
use tracing::error;

use super::types::{json, ApiResponse, EndpointError, Result};
use crate::application::application::Application;

#[derive(serde::Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

impl ApiResponse for HealthResponse {}

/// Liveness plus a trivial database round-trip.
pub async fn healthz(Extension(app): Extension<Application>) -> Result<impl IntoResponse> {
    app.store.ping().await.map_err(|err| {
        error!(?err, "database health check failed");
        EndpointError::internal("database unreachable")
    })?;
    Ok(json(HealthResponse {
        status: "ok",
        database: "connected",
    }))
}
