// RAG orchestration for /chat: retrieve, grade confidence from retrieval
// signals, assemble the context block, call the model, then mechanically
// verify every claimed citation against what was actually retrieved. The
// verification step is the only defense against hallucinated citations and
// runs unconditionally.

use std::collections::HashSet;

use tracing::error;

use super::prompts::answer_system_prompt;
use super::types::{response_schema, Answer, Citation, Confidence, LlmAnswer, LlmCitation};
use crate::db::store::{Session, StoreError};
use crate::db::types::RetrievedChunk;
use crate::llm::{LlmClient, LlmError};
use crate::retrieval;

/// At least this many chunks for the chunk-count confidence signal.
pub const MIN_CHUNKS_FOR_CONFIDENCE: usize = 3;
/// Top score at or above this for the score confidence signal.
pub const HIGH_SCORE_THRESHOLD: f32 = 0.1;

const EMPTY_KB_ANSWER: &str =
    "The knowledge base is empty. Sync a repository via POST /admin/sync-repo, then ask again.";
const NO_MATCH_ANSWER: &str = "I couldn't find anything relevant in the indexed repositories. \
     Try rephrasing your question or mentioning a file name.";
const LLM_FAILURE_ANSWER: &str =
    "I'm sorry, I encountered an error processing your question. Please try again.";

/// Both signals: high. One signal: medium. Neither (or nothing retrieved):
/// low.
pub fn compute_confidence(chunks: &[RetrievedChunk]) -> Confidence {
    if chunks.is_empty() {
        return Confidence::Low;
    }
    let enough_chunks = chunks.len() >= MIN_CHUNKS_FOR_CONFIDENCE;
    let high_score = chunks[0].score >= HIGH_SCORE_THRESHOLD;
    match (enough_chunks, high_score) {
        (true, true) => Confidence::High,
        (true, false) | (false, true) => Confidence::Medium,
        (false, false) => Confidence::Low,
    }
}

/// One header-plus-content block per chunk, blank line between blocks. The
/// header format is documented in the system prompt.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("--- CHUNK: {} ---\n{}", chunk.source(), chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Drop every claimed citation whose source string is not in the retrieved
/// set.
pub fn verify_citations(claimed: &[LlmCitation], chunks: &[RetrievedChunk]) -> Vec<Citation> {
    let valid_sources = chunks
        .iter()
        .map(RetrievedChunk::source)
        .collect::<HashSet<_>>();
    claimed
        .iter()
        .filter(|citation| valid_sources.contains(&citation.source))
        .map(|citation| Citation {
            source: citation.source.clone(),
            relevance: citation.relevance.clone(),
        })
        .collect()
}

pub async fn answer_question(
    session: &mut dyn Session,
    llm: &dyn LlmClient,
    question: &str,
) -> Result<Answer, StoreError> {
    let chunks = retrieval::retrieve(session, question).await?;

    if chunks.is_empty() {
        let answer = if session.has_chunks().await? {
            NO_MATCH_ANSWER
        } else {
            EMPTY_KB_ANSWER
        };
        return Ok(Answer {
            answer: answer.to_owned(),
            citations: Vec::new(),
            confidence: Confidence::Low,
        });
    }

    let confidence = compute_confidence(&chunks);
    let context = build_context(&chunks);
    let user_content = format!("Context:\n{context}\n\nQuestion: {question}");

    let llm_answer = match generate_structured(llm, &user_content).await {
        Ok(answer) => answer,
        Err(err) => {
            error!(?err, "llm generation failed");
            return Ok(Answer {
                answer: LLM_FAILURE_ANSWER.to_owned(),
                citations: Vec::new(),
                confidence: Confidence::Low,
            });
        }
    };

    // Runs even when the model asked for clarification.
    let citations = verify_citations(&llm_answer.citations, &chunks);

    if llm_answer.needs_clarification || citations.is_empty() {
        return Ok(Answer {
            answer: llm_answer.answer,
            citations,
            confidence: Confidence::Low,
        });
    }

    Ok(Answer {
        answer: llm_answer.answer,
        citations,
        confidence,
    })
}

async fn generate_structured(llm: &dyn LlmClient, user_content: &str) -> Result<LlmAnswer, LlmError> {
    let raw = llm
        .generate(&answer_system_prompt(), user_content, &response_schema())
        .await?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::Store;
    use crate::db::types::{NewChunk, NewFile, NewRepo};
    use crate::llm::InMemoryLlm;
    use async_trait::async_trait;

    fn chunk(id: i64, path: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            id,
            repo_owner: "testowner".into(),
            repo_name: "testrepo".into(),
            path: path.into(),
            commit_sha: "abc0000".into(),
            start_line: 1,
            end_line: 10,
            content: format!("content of {path}"),
            score,
        }
    }

    #[test]
    fn confidence_decision_table() {
        // 4 chunks, top score 0.15 -> both signals -> high.
        let four = (0..4).map(|i| chunk(i, "a.py", 0.15)).collect::<Vec<_>>();
        assert_eq!(compute_confidence(&four), Confidence::High);

        // 3 chunks, top score 0.05 -> count only -> medium.
        let three = (0..3).map(|i| chunk(i, "a.py", 0.05)).collect::<Vec<_>>();
        assert_eq!(compute_confidence(&three), Confidence::Medium);

        // 2 chunks, top score 0.2 -> score only -> medium.
        let two = (0..2).map(|i| chunk(i, "a.py", 0.2)).collect::<Vec<_>>();
        assert_eq!(compute_confidence(&two), Confidence::Medium);

        // 1 chunk, top score 0.05 -> neither -> low.
        let one = vec![chunk(0, "a.py", 0.05)];
        assert_eq!(compute_confidence(&one), Confidence::Low);

        assert_eq!(compute_confidence(&[]), Confidence::Low);
    }

    #[test]
    fn context_blocks_carry_headers_and_blank_separators() {
        let chunks = vec![chunk(1, "src/a.py", 0.5), chunk(2, "src/b.py", 0.4)];
        let context = build_context(&chunks);
        assert_eq!(
            context,
            "--- CHUNK: testowner/testrepo/src/a.py@abc0000:1-10 ---\n\
             content of src/a.py\n\
             \n\
             --- CHUNK: testowner/testrepo/src/b.py@abc0000:1-10 ---\n\
             content of src/b.py"
        );
    }

    #[test]
    fn hallucinated_citations_are_dropped() {
        let chunks = vec![
            chunk(1, "s1.py", 0.5),
            chunk(2, "s2.py", 0.4),
            chunk(3, "s3.py", 0.3),
        ];
        let claimed = vec![
            LlmCitation {
                source: chunks[0].source(),
                relevance: "first".into(),
            },
            LlmCitation {
                source: chunks[1].source(),
                relevance: "second".into(),
            },
            LlmCitation {
                source: "testowner/testrepo/fake.py@ffff:1-2".into(),
                relevance: "made up".into(),
            },
        ];
        let verified = verify_citations(&claimed, &chunks);
        assert_eq!(verified.len(), 2);
        assert_eq!(verified[0].source, chunks[0].source());
        assert_eq!(verified[1].source, chunks[1].source());
    }

    async fn seed_store(contents: &[(&str, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        let mut session = store.session().await.unwrap();
        session
            .insert_repo(NewRepo {
                id: 1,
                owner: "testowner",
                name: "testrepo",
                default_branch: "main",
            })
            .await
            .unwrap();
        for (path, content) in contents {
            let file = session
                .insert_file(NewFile {
                    repo_id: 1,
                    path,
                    commit_sha: "abc0000",
                    sha256: "deadbeef",
                })
                .await
                .unwrap();
            session
                .insert_chunks(&[NewChunk {
                    repo_id: 1,
                    file_id: file.id,
                    path,
                    commit_sha: "abc0000",
                    start_line: 1,
                    end_line: 10,
                    content,
                }])
                .await
                .unwrap();
        }
        session.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn empty_store_gets_the_sync_hint() {
        let store = MemoryStore::new();
        let llm = InMemoryLlm::new();
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &llm, "anything at all")
            .await
            .unwrap();
        assert!(answer.answer.contains("/admin/sync-repo"));
        assert!(answer.citations.is_empty());
        assert_eq!(answer.confidence, Confidence::Low);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_retrieval_on_populated_store_suggests_rephrasing() {
        let store = seed_store(&[("a.py", "completely unrelated words")]).await;
        let llm = InMemoryLlm::new();
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &llm, "zzzqqq")
            .await
            .unwrap();
        assert!(answer.answer.contains("rephrasing"));
        assert_eq!(answer.confidence, Confidence::Low);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_answer_carries_verified_citations() {
        let store = seed_store(&[
            ("a.py", "the indexer writes chunk rows"),
            ("b.py", "the indexer is idempotent"),
            ("c.py", "the indexer skips denied paths"),
        ])
        .await;
        let llm = InMemoryLlm::new();
        llm.respond_with(
            r#"{"answer":"The indexer writes chunks.","citations":[{"source":"testowner/testrepo/a.py@abc0000:1-10","relevance":"write path"},{"source":"testowner/testrepo/zzz.py@abc0000:1-10","relevance":"fake"}],"needs_clarification":false,"clarifying_question":null}"#,
        );
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &llm, "indexer").await.unwrap();
        assert_eq!(answer.answer, "The indexer writes chunks.");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(
            answer.citations[0].source,
            "testowner/testrepo/a.py@abc0000:1-10"
        );
        assert_eq!(answer.confidence, Confidence::High);

        // The model saw the context block and the question.
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].user_content.starts_with("Context:\n--- CHUNK: "));
        assert!(calls[0].user_content.ends_with("Question: indexer"));
        assert!(calls[0].system_prompt.contains("code knowledge assistant"));
    }

    #[tokio::test]
    async fn clarification_requests_force_low_confidence() {
        let store = seed_store(&[
            ("a.py", "the indexer writes chunk rows"),
            ("b.py", "the indexer is idempotent"),
            ("c.py", "the indexer skips denied paths"),
        ])
        .await;
        let llm = InMemoryLlm::new();
        llm.respond_with(
            r#"{"answer":"I don't know","citations":[{"source":"testowner/testrepo/a.py@abc0000:1-10","relevance":"partial"}],"needs_clarification":true,"clarifying_question":"Which indexer?"}"#,
        );
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &llm, "indexer").await.unwrap();
        assert_eq!(answer.answer, "I don't know");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn no_surviving_citations_force_low_confidence() {
        let store = seed_store(&[
            ("a.py", "the indexer writes chunk rows"),
            ("b.py", "the indexer is idempotent"),
            ("c.py", "the indexer skips denied paths"),
        ])
        .await;
        let llm = InMemoryLlm::new();
        llm.respond_with(
            r#"{"answer":"An answer.","citations":[{"source":"not/a/real@sha:1-2","relevance":"x"}],"needs_clarification":false,"clarifying_question":null}"#,
        );
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &llm, "indexer").await.unwrap();
        assert_eq!(answer.answer, "An answer.");
        assert!(answer.citations.is_empty());
        assert_eq!(answer.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn malformed_llm_output_degrades_gracefully() {
        let store = seed_store(&[("a.py", "the indexer writes chunk rows")]).await;
        let llm = InMemoryLlm::new();
        llm.respond_with("this is not json");
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &llm, "indexer").await.unwrap();
        assert_eq!(answer.answer, LLM_FAILURE_ANSWER);
        assert!(answer.citations.is_empty());
        assert_eq!(answer.confidence, Confidence::Low);
    }

    struct FailingLlm;

    #[async_trait]
    impl crate::llm::LlmClient for FailingLlm {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_content: &str,
            _response_schema: &serde_json::Value,
        ) -> Result<String, crate::llm::LlmError> {
            Err(crate::llm::LlmError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn llm_transport_errors_degrade_gracefully() {
        let store = seed_store(&[("a.py", "the indexer writes chunk rows")]).await;
        let mut session = store.session().await.unwrap();

        let answer = answer_question(session.as_mut(), &FailingLlm, "indexer")
            .await
            .unwrap();
        assert_eq!(answer.answer, LLM_FAILURE_ANSWER);
        assert_eq!(answer.confidence, Confidence::Low);
    }
}
