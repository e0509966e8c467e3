// Push webhook intake. The raw body is authenticated with HMAC-SHA256
// against the shared secret before anything is parsed; a missing header is a
// schema problem (422), a wrong one an auth problem (401).

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::error;

use super::types::{json, ApiResponse, EndpointError, Result};
use crate::application::application::Application;
use crate::ingestion::{self, PushEvent};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

type HmacSha256 = Hmac<Sha256>;

#[derive(serde::Serialize)]
pub(crate) struct WebhookResponse {
    status: &'static str,
    tasks_enqueued: usize,
}

impl ApiResponse for WebhookResponse {}

pub async fn github(
    Extension(app): Extension<Application>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return Err(EndpointError::user("missing X-Hub-Signature-256 header"));
    };

    if !verify_signature(&app.config.github_webhook_secret, &body, signature) {
        return Err(EndpointError::unauthorized("invalid webhook signature"));
    }

    let event: PushEvent = serde_json::from_slice(&body)
        .map_err(|err| EndpointError::user(format!("malformed push payload: {err}")))?;

    let tasks_enqueued = ingestion::dispatch_push(
        app.queue.as_ref(),
        &app.config.task_handler_base_url,
        &event,
    )
    .await
    .map_err(|err| {
        error!(?err, "webhook dispatch failed");
        EndpointError::internal("Internal server error")
    })?;

    Ok((
        StatusCode::ACCEPTED,
        json(WebhookResponse {
            status: "accepted",
            tasks_enqueued,
        }),
    ))
}

/// Constant-time check of `sha256=<hex>` against the body's HMAC.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(claimed) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&claimed).is_ok()
}

/// Produce the `X-Hub-Signature-256` value for a body, the counterpart of
/// `verify_signature`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
