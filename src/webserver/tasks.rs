// Task handlers, invoked by the queue with at-least-once delivery. A
// success commits the unit of work and returns the outcome; any failure
// drops the session (rolling it back) and answers 500 so the queue retries.

use axum::response::IntoResponse;
use axum::Extension;
use tracing::error;

use super::types::{json, ApiResponse, EndpointError, Json, Result};
use crate::application::application::Application;
use crate::indexer::{self, DeleteOutcome, IndexOutcome};
use crate::ingestion::{DeleteFilePayload, IndexFilePayload};

impl ApiResponse for IndexOutcome {}
impl ApiResponse for DeleteOutcome {}

pub async fn index_file(
    Extension(app): Extension<Application>,
    Json(payload): Json<IndexFilePayload>,
) -> Result<impl IntoResponse> {
    let failed = |err| {
        error!(?err, path = %payload.path, "index-file task failed");
        EndpointError::internal(format!("failed to index file: {}", payload.path))
    };

    let mut session = app
        .store
        .session()
        .await
        .map_err(|err| failed(crate::indexer::IndexError::Store(err)))?;
    let outcome = indexer::index_file(
        session.as_mut(),
        app.codehost.as_ref(),
        &payload.repo_owner,
        &payload.repo_name,
        payload.repo_id,
        &payload.path,
        &payload.commit_sha,
    )
    .await
    .map_err(&failed)?;
    session
        .commit()
        .await
        .map_err(|err| failed(crate::indexer::IndexError::Store(err)))?;

    Ok(json(outcome))
}

pub async fn delete_file(
    Extension(app): Extension<Application>,
    Json(payload): Json<DeleteFilePayload>,
) -> Result<impl IntoResponse> {
    let failed = |err| {
        error!(?err, path = %payload.path, "delete-file task failed");
        EndpointError::internal(format!("failed to delete file: {}", payload.path))
    };

    let mut session = app.store.session().await.map_err(&failed)?;
    let outcome = indexer::delete_file(session.as_mut(), payload.repo_id, &payload.path)
        .await
        .map_err(&failed)?;
    session.commit().await.map_err(&failed)?;

    Ok(json(outcome))
}
