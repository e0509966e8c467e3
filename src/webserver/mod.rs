// Route table for the service. Handlers get the `Application` handle as an
// Extension; panics are caught into the JSON 500 envelope so the queue and
// clients always see a parseable body.

pub mod admin;
pub mod chat;
pub mod health;
pub mod tasks;
pub(crate) mod types;
pub mod webhooks;

use std::any::Any;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use crate::application::application::Application;

pub fn router(app: Application) -> Router {
    let api = Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/webhooks", webhook_router())
        .nest("/tasks", task_router())
        .nest("/admin", admin_router())
        .route("/chat", post(chat::chat));

    api.layer(Extension(app))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

fn webhook_router() -> Router {
    Router::new().route("/github", post(webhooks::github))
}

fn task_router() -> Router {
    Router::new()
        .route("/index-file", post(tasks::index_file))
        .route("/delete-file", post(tasks::delete_file))
}

fn admin_router() -> Router {
    Router::new()
        .route("/sync-repo", post(admin::sync_repo))
        .route("/backfill", post(admin::backfill))
        .route("/ingest-url", post(admin::ingest_url))
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"detail": "Internal server error"})),
    )
        .into_response()
}
