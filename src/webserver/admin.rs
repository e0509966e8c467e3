// Admin surface for seeding the knowledge base: single-repo sync, batched
// backfill, and raw URL ingestion for content that lives outside any code
// host.

use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;
use tracing::error;

use super::types::{json, ApiResponse, EndpointError, Json, Result};
use crate::application::application::Application;
use crate::ingestion::{self, BackfillRepo, BackfillReport, SyncReport, UrlIngestReport};

impl ApiResponse for SyncReport {}
impl ApiResponse for BackfillReport {}
impl ApiResponse for UrlIngestReport {}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncRepoRequest {
    owner: String,
    repo: String,
    #[serde(rename = "ref", default = "default_ref")]
    reference: String,
}

fn default_ref() -> String {
    "main".to_owned()
}

pub async fn sync_repo(
    Extension(app): Extension<Application>,
    Json(request): Json<SyncRepoRequest>,
) -> Result<impl IntoResponse> {
    let report = ingestion::sync_repo(
        app.codehost.as_ref(),
        app.queue.as_ref(),
        &app.config.task_handler_base_url,
        &request.owner,
        &request.repo,
        &request.reference,
    )
    .await
    .map_err(|err| {
        error!(owner = %request.owner, repo = %request.repo, ?err, "repo sync failed");
        EndpointError::upstream(format!("failed to sync {}/{}", request.owner, request.repo))
    })?;

    Ok(json(report))
}

#[derive(Debug, Deserialize)]
pub(crate) struct BackfillRequest {
    repos: Vec<BackfillRepo>,
}

pub async fn backfill(
    Extension(app): Extension<Application>,
    Json(request): Json<BackfillRequest>,
) -> Result<impl IntoResponse> {
    if request.repos.is_empty() {
        return Err(EndpointError::user("repos must not be empty"));
    }

    // Per-repo failures are isolated inside the report.
    let report = ingestion::backfill(
        app.codehost.as_ref(),
        app.queue.as_ref(),
        &app.config.task_handler_base_url,
        &request.repos,
    )
    .await;

    Ok(json(report))
}

#[derive(Debug, Deserialize)]
pub(crate) struct IngestUrlRequest {
    url: String,
    repo_owner: String,
    repo_name: String,
    #[serde(default)]
    path: Option<String>,
}

pub async fn ingest_url(
    Extension(app): Extension<Application>,
    Json(request): Json<IngestUrlRequest>,
) -> Result<impl IntoResponse> {
    let failed = |err| {
        error!(url = %request.url, ?err, "url ingestion failed");
        EndpointError::upstream(format!("failed to ingest {}", request.url))
    };

    let mut session = app
        .store
        .session()
        .await
        .map_err(|err| failed(ingestion::IngestError::Store(err)))?;
    let report = ingestion::ingest_url(
        session.as_mut(),
        &request.url,
        &request.repo_owner,
        &request.repo_name,
        request.path.as_deref(),
    )
    .await
    .map_err(&failed)?;
    session
        .commit()
        .await
        .map_err(|err| failed(ingestion::IngestError::Store(err)))?;

    Ok(json(report))
}
