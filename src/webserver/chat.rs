// The question-answering endpoint. Validation failures are the caller's
// problem (422); store failures bubble up as 500; LLM trouble never reaches
// this layer because the orchestrator converts it into a graceful
// low-confidence answer.

use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;
use tracing::error;

use super::types::{json, ApiResponse, EndpointError, Json, Result};
use crate::agent::answer::answer_question;
use crate::agent::types::Answer;
use crate::application::application::Application;

const MAX_QUESTION_CHARS: usize = 1000;

impl ApiResponse for Answer {}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    question: String,
}

pub async fn chat(
    Extension(app): Extension<Application>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse> {
    let length = request.question.chars().count();
    if length == 0 || length > MAX_QUESTION_CHARS {
        return Err(EndpointError::user(
            "question must be between 1 and 1000 characters",
        ));
    }

    let internal = |err| {
        error!(?err, "chat retrieval failed");
        EndpointError::internal("Internal server error")
    };

    let mut session = app.store.session().await.map_err(&internal)?;
    let answer = answer_question(session.as_mut(), app.llm.as_ref(), &request.question)
        .await
        .map_err(&internal)?;
    session.commit().await.map_err(&internal)?;

    Ok(json(answer))
}
