// Three-stage retrieval cascade. Conjunctive full-text search first; if that
// finds nothing, a disjunction over the query's words; if the result set is
// still thin, trigram similarity against file paths tops it up. Results are
// deduplicated by chunk id and capped.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::store::{Session, StoreError};
use crate::db::types::RetrievedChunk;

/// Hard cap on chunks handed to the context builder.
pub const MAX_CHUNKS: usize = 12;
/// Below this many full-text hits, the path fallback kicks in.
pub const MIN_FTS_RESULTS: usize = 3;
/// Path similarity must be strictly above this to count.
pub const TRIGRAM_THRESHOLD: f32 = 0.15;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

/// Maximal alphanumeric-or-underscore words of the query, deduplicated with
/// order preserved. Safe to splice into a tsquery disjunction.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    WORD.find_iter(query)
        .map(|m| m.as_str().to_owned())
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

pub async fn retrieve(
    session: &mut dyn Session,
    query: &str,
) -> Result<Vec<RetrievedChunk>, StoreError> {
    retrieve_with(session, query, MIN_FTS_RESULTS, MAX_CHUNKS).await
}

pub async fn retrieve_with(
    session: &mut dyn Session,
    query: &str,
    min_fts_results: usize,
    max_chunks: usize,
) -> Result<Vec<RetrievedChunk>, StoreError> {
    let mut results = session.search_terms(query, max_chunks as i64).await?;

    // The disjunctive fallback only fires when AND matched nothing at all.
    if results.is_empty() {
        let terms = query_terms(query);
        if !terms.is_empty() {
            results = session.search_any_term(&terms, max_chunks as i64).await?;
        }
    }

    if results.len() < min_fts_results {
        let by_path = session
            .search_paths(query, TRIGRAM_THRESHOLD, max_chunks as i64)
            .await?;
        let mut seen = results.iter().map(|chunk| chunk.id).collect::<HashSet<_>>();
        for chunk in by_path {
            if results.len() >= max_chunks {
                break;
            }
            if seen.insert(chunk.id) {
                results.push(chunk);
            }
        }
    }

    results.truncate(max_chunks);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::Store;
    use crate::db::types::{NewChunk, NewFile, NewRepo};

    #[test]
    fn query_terms_deduplicates_preserving_order() {
        assert_eq!(
            query_terms("how does how the indexer work indexer"),
            vec!["how", "does", "the", "indexer", "work"]
        );
        assert_eq!(
            query_terms("parse_query() && retry!"),
            vec!["parse_query", "retry"]
        );
        assert!(query_terms("!!! ???").is_empty());
    }

    async fn seed(store: &MemoryStore, files: &[(&str, &[&str])]) {
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
        for (path, chunks) in files {
            let file = session
                .insert_file(NewFile {
                    repo_id: 1,
                    path,
                    commit_sha: "abc0000",
                    sha256: "deadbeef",
                })
                .await
                .unwrap();
            let rows = chunks
                .iter()
                .enumerate()
                .map(|(i, content)| NewChunk {
                    repo_id: 1,
                    file_id: file.id,
                    path,
                    commit_sha: "abc0000",
                    start_line: (i * 10 + 1) as i32,
                    end_line: (i * 10 + 10) as i32,
                    content,
                })
                .collect::<Vec<_>>();
            session.insert_chunks(&rows).await.unwrap();
        }
        session.commit().await.unwrap();
    }

    #[tokio::test]
    async fn stage_one_hits_suppress_the_or_fallback() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                ("a.py", &["the webhook dispatcher enqueues jobs"]),
                ("b.py", &["only dispatcher lives here"]),
            ],
        )
        .await;

        let mut session = store.session().await.unwrap();
        let results = retrieve(session.as_mut(), "webhook dispatcher").await.unwrap();
        // b.py matches "dispatcher" alone, but stage 1 found a conjunctive
        // hit, so the disjunction never runs. The trigram stage finds no
        // similar paths for this query.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "a.py");
    }

    #[tokio::test]
    async fn or_fallback_fires_only_on_zero_hits() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                ("a.py", &["the webhook dispatcher enqueues jobs"]),
                ("b.py", &["retries are hard"]),
            ],
        )
        .await;

        let mut session = store.session().await.unwrap();
        let results = retrieve(session.as_mut(), "dispatcher nonsenseword")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "a.py");
    }

    #[tokio::test]
    async fn trigram_stage_tops_up_thin_results() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                ("src/retrieval.py", &["def cascade(): pass"]),
                ("src/other.py", &["nothing to see"]),
            ],
        )
        .await;

        let mut session = store.session().await.unwrap();
        // No content token matches "retrieval", but the path does.
        let results = retrieve(session.as_mut(), "retrieval").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/retrieval.py");
    }

    #[tokio::test]
    async fn merged_results_deduplicate_by_chunk_id() {
        let store = MemoryStore::new();
        seed(&store, &[("src/retrieval.py", &["retrieval cascade code"])]).await;

        let mut session = store.session().await.unwrap();
        // Stage 1 matches the chunk by content and stage 3 matches the same
        // chunk by path; it must appear once.
        let results = retrieve(session.as_mut(), "retrieval").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn results_are_capped_at_max_chunks() {
        let store = MemoryStore::new();
        let contents = (0..20)
            .map(|i| format!("indexer detail number {i}"))
            .collect::<Vec<_>>();
        let refs = contents.iter().map(String::as_str).collect::<Vec<_>>();
        seed(&store, &[("big.py", &refs)]).await;

        let mut session = store.session().await.unwrap();
        let results = retrieve(session.as_mut(), "indexer").await.unwrap();
        assert_eq!(results.len(), MAX_CHUNKS);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let store = MemoryStore::new();
        seed(&store, &[("a.py", &["content"])]).await;

        let mut session = store.session().await.unwrap();
        let results = retrieve(session.as_mut(), "!!!").await.unwrap();
        assert!(results.is_empty());
    }
}
