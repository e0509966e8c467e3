// The store boundary. A `Store` hands out `Session`s; a session is one unit
// of work which must be committed explicitly and rolls back when dropped
// uncommitted. Handlers open exactly one session per request and never share
// it across requests.

use async_trait::async_trait;

use super::types::{KbFile, NewChunk, NewFile, NewRepo, Repo, RetrievedChunk};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("constraint violation: {0}")]
    Constraint(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work.
    async fn session(&self) -> Result<Box<dyn Session>, StoreError>;

    /// A trivial round-trip, used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Session: Send {
    async fn repo_by_id(&mut self, id: i64) -> Result<Option<Repo>, StoreError>;

    async fn repo_by_owner_name(
        &mut self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repo>, StoreError>;

    async fn insert_repo(&mut self, repo: NewRepo<'_>) -> Result<Repo, StoreError>;

    async fn file_by_path(
        &mut self,
        repo_id: i64,
        path: &str,
    ) -> Result<Option<KbFile>, StoreError>;

    /// Insert and flush, returning the row with its generated id.
    async fn insert_file(&mut self, file: NewFile<'_>) -> Result<KbFile, StoreError>;

    async fn update_file(
        &mut self,
        id: i64,
        commit_sha: &str,
        sha256: &str,
    ) -> Result<(), StoreError>;

    async fn insert_chunks(&mut self, chunks: &[NewChunk<'_>]) -> Result<(), StoreError>;

    /// Delete all chunks owned by a file, returning how many went away.
    async fn delete_chunks(&mut self, file_id: i64) -> Result<u64, StoreError>;

    async fn delete_file(&mut self, id: i64) -> Result<(), StoreError>;

    /// Conjunctive full-text search (quoted phrases supported), ranked by
    /// cover density.
    async fn search_terms(
        &mut self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Disjunctive full-text search over pre-tokenized terms.
    async fn search_any_term(
        &mut self,
        terms: &[String],
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Trigram similarity against the owning file's path; rows strictly above
    /// `threshold` only.
    async fn search_paths(
        &mut self,
        query: &str,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    async fn has_chunks(&mut self) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
