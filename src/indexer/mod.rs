// Orchestrates one file's trip through the pipeline: denylist check, fetch
// from the code host, content-hash dedup, chunking and the chunk-row
// rewrite. Everything runs inside the caller's store session, so a failure
// anywhere rolls the whole file back and the queue's retry gets a clean
// slate. Repeated delivery with identical inputs converges: steps are keyed
// on (repo_id, path) and the content hash, never on call counts.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::chunking::chunk_file;
use crate::db::store::{Session, StoreError};
use crate::db::types::{NewChunk, NewFile, NewRepo, Repo};
use crate::github::{CodeHost, CodeHostError};
use crate::repo::denylist::is_denied;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    CodeHost(#[from] CodeHostError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    Skipped { reason: SkipReason },
    Unchanged,
    Indexed { chunks: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Denylist,
    NotFound,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Result of writing content into the store, shared by the code-host path
/// and URL ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Unchanged,
    Indexed { chunks: usize },
}

/// Make sure a repo row exists and return the authoritative one. Lookup by
/// id first, then by (owner, name): a repo created earlier under a synthetic
/// id keeps that id even when a later call brings the real host id, so child
/// foreign keys stay coherent.
pub async fn resolve_repo(
    session: &mut dyn Session,
    repo_id: i64,
    owner: &str,
    name: &str,
) -> Result<Repo, StoreError> {
    if let Some(repo) = session.repo_by_id(repo_id).await? {
        return Ok(repo);
    }
    if let Some(repo) = session.repo_by_owner_name(owner, name).await? {
        return Ok(repo);
    }
    session
        .insert_repo(NewRepo {
            id: repo_id,
            owner,
            name,
            default_branch: "main",
        })
        .await
}

pub async fn index_file(
    session: &mut dyn Session,
    host: &dyn CodeHost,
    owner: &str,
    name: &str,
    repo_id: i64,
    path: &str,
    commit_sha: &str,
) -> Result<IndexOutcome, IndexError> {
    let repo = resolve_repo(session, repo_id, owner, name).await?;

    if is_denied(path, None) {
        debug!(path, "skipping denied path");
        return Ok(IndexOutcome::Skipped {
            reason: SkipReason::Denylist,
        });
    }

    let Some(content) = host.file_content(owner, name, path, commit_sha).await? else {
        debug!(path, commit_sha, "file not found on code host");
        return Ok(IndexOutcome::Skipped {
            reason: SkipReason::NotFound,
        });
    };

    let size_bytes = content.len() as u64;
    if is_denied(path, Some(size_bytes)) {
        debug!(path, size_bytes, "skipping oversized file");
        return Ok(IndexOutcome::Skipped {
            reason: SkipReason::Size,
        });
    }

    let outcome = upsert_content(session, repo.id, path, commit_sha, &content).await?;
    Ok(match outcome {
        UpsertOutcome::Unchanged => IndexOutcome::Unchanged,
        UpsertOutcome::Indexed { chunks } => IndexOutcome::Indexed { chunks },
    })
}

/// Steps 5-8 of the indexing flow: hash, dedup against the existing row,
/// replace the chunk set atomically when the content changed.
pub async fn upsert_content(
    session: &mut dyn Session,
    repo_id: i64,
    path: &str,
    commit_sha: &str,
    content: &str,
) -> Result<UpsertOutcome, StoreError> {
    let content_hash = hex::encode(Sha256::digest(content.as_bytes()));

    let file = match session.file_by_path(repo_id, path).await? {
        Some(existing) if existing.sha256 == content_hash => {
            // Same bytes at a new revision: just move the sha pointer.
            session
                .update_file(existing.id, commit_sha, &content_hash)
                .await?;
            return Ok(UpsertOutcome::Unchanged);
        }
        Some(existing) => {
            session.delete_chunks(existing.id).await?;
            session
                .update_file(existing.id, commit_sha, &content_hash)
                .await?;
            existing
        }
        None => {
            session
                .insert_file(NewFile {
                    repo_id,
                    path,
                    commit_sha,
                    sha256: &content_hash,
                })
                .await?
        }
    };

    let chunks = chunk_file(content, path);
    let rows = chunks
        .iter()
        .map(|chunk| NewChunk {
            repo_id,
            file_id: file.id,
            path,
            commit_sha,
            start_line: chunk.start_line as i32,
            end_line: chunk.end_line as i32,
            content: &chunk.text,
        })
        .collect::<Vec<_>>();
    session.insert_chunks(&rows).await?;

    info!(path, chunks = rows.len(), "file indexed");
    Ok(UpsertOutcome::Indexed { chunks: rows.len() })
}

pub async fn delete_file(
    session: &mut dyn Session,
    repo_id: i64,
    path: &str,
) -> Result<DeleteOutcome, StoreError> {
    let Some(file) = session.file_by_path(repo_id, path).await? else {
        return Ok(DeleteOutcome::NotFound);
    };
    session.delete_chunks(file.id).await?;
    session.delete_file(file.id).await?;
    info!(path, repo_id, "file deleted");
    Ok(DeleteOutcome::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::Store;
    use crate::github::InMemoryCodeHost;

    const REPO_ID: i64 = 42;

    fn host_with(path: &str, content: &str) -> InMemoryCodeHost {
        let host = InMemoryCodeHost::new(REPO_ID);
        host.add_file(path, content);
        host
    }

    async fn run_index(
        store: &MemoryStore,
        host: &InMemoryCodeHost,
        path: &str,
        commit_sha: &str,
    ) -> IndexOutcome {
        let mut session = store.session().await.unwrap();
        let outcome = index_file(
            session.as_mut(),
            host,
            "testowner",
            "testrepo",
            REPO_ID,
            path,
            commit_sha,
        )
        .await
        .unwrap();
        session.commit().await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn indexes_a_new_file() {
        let store = MemoryStore::new();
        let host = host_with("src/main.py", "def main():\n    pass");

        let outcome = run_index(&store, &host, "src/main.py", "abc0000").await;
        assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });

        let mut session = store.session().await.unwrap();
        let file = session
            .file_by_path(REPO_ID, "src/main.py")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.commit_sha, "abc0000");
        assert!(session.has_chunks().await.unwrap());
    }

    #[tokio::test]
    async fn denied_path_is_skipped_before_fetch() {
        let store = MemoryStore::new();
        let host = host_with("node_modules/react/index.js", "whatever");

        let outcome = run_index(&store, &host, "node_modules/react/index.js", "abc0000").await;
        assert_eq!(
            outcome,
            IndexOutcome::Skipped {
                reason: SkipReason::Denylist
            }
        );
    }

    #[tokio::test]
    async fn missing_file_is_skipped() {
        let store = MemoryStore::new();
        let host = InMemoryCodeHost::new(REPO_ID);

        let outcome = run_index(&store, &host, "src/gone.py", "abc0000").await;
        assert_eq!(
            outcome,
            IndexOutcome::Skipped {
                reason: SkipReason::NotFound
            }
        );
    }

    #[tokio::test]
    async fn oversized_content_is_skipped() {
        let store = MemoryStore::new();
        let big = "x".repeat(500_001);
        let host = host_with("src/big.py", &big);

        let outcome = run_index(&store, &host, "src/big.py", "abc0000").await;
        assert_eq!(
            outcome,
            IndexOutcome::Skipped {
                reason: SkipReason::Size
            }
        );
    }

    #[tokio::test]
    async fn unchanged_content_updates_commit_sha_only() {
        let store = MemoryStore::new();
        let host = host_with("src/main.py", "def main():\n    pass");

        assert_eq!(
            run_index(&store, &host, "src/main.py", "sha_x").await,
            IndexOutcome::Indexed { chunks: 1 }
        );
        let mut session = store.session().await.unwrap();
        let before = session
            .file_by_path(REPO_ID, "src/main.py")
            .await
            .unwrap()
            .unwrap();
        drop(session);

        assert_eq!(
            run_index(&store, &host, "src/main.py", "sha_y").await,
            IndexOutcome::Unchanged
        );
        let mut session = store.session().await.unwrap();
        let after = session
            .file_by_path(REPO_ID, "src/main.py")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.commit_sha, "sha_y");
        assert_eq!(after.sha256, before.sha256);
    }

    #[tokio::test]
    async fn changed_content_replaces_the_chunk_set() {
        let store = MemoryStore::new();
        let host = host_with("README.md", "# One\ntext\n# Two\ntext\n# Three\ntext");
        assert_eq!(
            run_index(&store, &host, "README.md", "sha_x").await,
            IndexOutcome::Indexed { chunks: 3 }
        );

        host.add_file(
            "README.md",
            "# A\ntext\n# B\ntext\n# C\ntext\n# D\ntext\n# E\ntext",
        );
        assert_eq!(
            run_index(&store, &host, "README.md", "sha_y").await,
            IndexOutcome::Indexed { chunks: 5 }
        );

        let mut session = store.session().await.unwrap();
        let results = session.search_any_term(&["text".into()], 50).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|c| c.commit_sha == "sha_y"));
    }

    #[tokio::test]
    async fn reindexing_is_idempotent() {
        let store = MemoryStore::new();
        let host = host_with("src/app.py", "def handler():\n    return 1");

        run_index(&store, &host, "src/app.py", "abc0000").await;
        let mut session = store.session().await.unwrap();
        let first = session.search_any_term(&["handler".into()], 50).await.unwrap();
        drop(session);

        run_index(&store, &host, "src/app.py", "abc0000").await;
        let mut session = store.session().await.unwrap();
        let second = session.search_any_term(&["handler".into()], 50).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn synthetic_repo_id_is_reconciled_by_owner_name() {
        let store = MemoryStore::new();
        let host = host_with("src/main.py", "def main():\n    pass");

        // First index under a synthetic id.
        let mut session = store.session().await.unwrap();
        let repo = resolve_repo(session.as_mut(), 12345, "testowner", "testrepo")
            .await
            .unwrap();
        assert_eq!(repo.id, 12345);
        session.commit().await.unwrap();

        // A later call with the real host id lands on the existing row.
        let outcome = run_index(&store, &host, "src/main.py", "abc0000").await;
        assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });

        let mut session = store.session().await.unwrap();
        assert!(session
            .file_by_path(12345, "src/main.py")
            .await
            .unwrap()
            .is_some());
        assert!(session.repo_by_id(REPO_ID).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_file_removes_file_and_chunks() {
        let store = MemoryStore::new();
        let host = host_with("src/main.py", "def main():\n    pass");
        run_index(&store, &host, "src/main.py", "abc0000").await;

        let mut session = store.session().await.unwrap();
        assert_eq!(
            delete_file(session.as_mut(), REPO_ID, "src/main.py")
                .await
                .unwrap(),
            DeleteOutcome::Deleted
        );
        session.commit().await.unwrap();

        let mut session = store.session().await.unwrap();
        assert!(session
            .file_by_path(REPO_ID, "src/main.py")
            .await
            .unwrap()
            .is_none());
        assert!(!session.has_chunks().await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_file_reports_not_found() {
        let store = MemoryStore::new();
        let mut session = store.session().await.unwrap();
        assert_eq!(
            delete_file(session.as_mut(), REPO_ID, "src/ghost.py")
                .await
                .unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[test]
    fn outcomes_serialize_to_the_wire_shape() {
        assert_eq!(
            serde_json::to_value(IndexOutcome::Skipped {
                reason: SkipReason::Denylist
            })
            .unwrap(),
            serde_json::json!({"status": "skipped", "reason": "denylist"})
        );
        assert_eq!(
            serde_json::to_value(IndexOutcome::Indexed { chunks: 5 }).unwrap(),
            serde_json::json!({"status": "indexed", "chunks": 5})
        );
        assert_eq!(
            serde_json::to_value(IndexOutcome::Unchanged).unwrap(),
            serde_json::json!({"status": "unchanged"})
        );
        assert_eq!(
            serde_json::to_value(DeleteOutcome::Deleted).unwrap(),
            serde_json::json!({"status": "deleted"})
        );
    }
}
