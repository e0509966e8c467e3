use serde::{Deserialize, Serialize};

/// Retrieval-derived confidence. Never reported by the model itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A citation that survived verification against the retrieved set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// `owner/repo/path@sha:start_line-end_line`
    pub source: String,
    /// How this chunk relates to the answer.
    pub relevance: String,
}

/// The completed chat answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
}

/// What the model is asked to produce. Citations here are claims, verified
/// only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmAnswer {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<LlmCitation>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_question: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmCitation {
    pub source: String,
    pub relevance: String,
}

/// Structured-output schema enforced on the model, mirroring `LlmAnswer`.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "answer": {"type": "STRING"},
            "citations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "source": {"type": "STRING"},
                        "relevance": {"type": "STRING"}
                    },
                    "required": ["source", "relevance"]
                }
            },
            "needs_clarification": {"type": "BOOLEAN"},
            "clarifying_question": {"type": "STRING", "nullable": true}
        },
        "required": ["answer", "citations", "needs_clarification"]
    })
}
