// The LLM boundary: one structured-generation call. The model receives a
// system prompt, the user content, and a response schema it must satisfy;
// it returns raw JSON text which the caller validates. Transport failures
// and schema-violating output both surface as `LlmError` so the chat
// orchestrator can fall back gracefully.

pub mod gemini;

use std::sync::Mutex;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed llm response: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("empty response from model")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_content: &str,
        response_schema: &serde_json::Value,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_content: String,
}

/// Test double that records calls and returns a canned JSON response.
pub struct InMemoryLlm {
    calls: Mutex<Vec<RecordedCall>>,
    response: Mutex<String>,
}

impl Default for InMemoryLlm {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: Mutex::new(
                r#"{"answer":"test answer","citations":[],"needs_clarification":false,"clarifying_question":null}"#
                    .to_owned(),
            ),
        }
    }
}

impl InMemoryLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, raw_json: &str) {
        *self.response.lock().unwrap() = raw_json.to_owned();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for InMemoryLlm {
    async fn generate(
        &self,
        system_prompt: &str,
        user_content: &str,
        _response_schema: &serde_json::Value,
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: system_prompt.to_owned(),
            user_content: user_content.to_owned(),
        });
        Ok(self.response.lock().unwrap().clone())
    }
}
