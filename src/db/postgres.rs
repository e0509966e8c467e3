// Postgres-backed store. Full-text search runs on the generated
// `content_tsv` column with cover-density ranking; the path fallback uses
// pg_trgm similarity. All statements in a session share one transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::store::{Session, Store, StoreError};
use super::types::{KbFile, NewChunk, NewFile, NewRepo, Repo, RetrievedChunk};

const REPO_COLUMNS: &str = "id, owner, name, default_branch, updated_at";
const FILE_COLUMNS: &str = "id, repo_id, path, commit_sha, sha256, updated_at";

pub struct Postgres {
    pool: PgPool,
}

impl Postgres {
    /// Connect with a small fixed pool and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for Postgres {
    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgSession {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

fn repo_from_row(row: &PgRow) -> Result<Repo, sqlx::Error> {
    Ok(Repo {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        default_branch: row.try_get("default_branch")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn file_from_row(row: &PgRow) -> Result<KbFile, sqlx::Error> {
    Ok(KbFile {
        id: row.try_get("id")?,
        repo_id: row.try_get("repo_id")?,
        path: row.try_get("path")?,
        commit_sha: row.try_get("commit_sha")?,
        sha256: row.try_get("sha256")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn retrieved_from_row(row: &PgRow) -> Result<RetrievedChunk, sqlx::Error> {
    Ok(RetrievedChunk {
        id: row.try_get("id")?,
        repo_owner: row.try_get("owner")?,
        repo_name: row.try_get("name")?,
        path: row.try_get("path")?,
        commit_sha: row.try_get("commit_sha")?,
        start_line: row.try_get("start_line")?,
        end_line: row.try_get("end_line")?,
        content: row.try_get("content")?,
        score: row.try_get("score")?,
    })
}

#[async_trait]
impl Session for PgSession {
    async fn repo_by_id(&mut self, id: i64) -> Result<Option<Repo>, StoreError> {
        let row = sqlx::query(&format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(repo_from_row).transpose()?)
    }

    async fn repo_by_owner_name(
        &mut self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repo>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REPO_COLUMNS} FROM repos WHERE owner = $1 AND name = $2"
        ))
        .bind(owner)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.as_ref().map(repo_from_row).transpose()?)
    }

    async fn insert_repo(&mut self, repo: NewRepo<'_>) -> Result<Repo, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO repos (id, owner, name, default_branch) \
             VALUES ($1, $2, $3, $4) RETURNING {REPO_COLUMNS}"
        ))
        .bind(repo.id)
        .bind(repo.owner)
        .bind(repo.name)
        .bind(repo.default_branch)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(repo_from_row(&row)?)
    }

    async fn file_by_path(
        &mut self,
        repo_id: i64,
        path: &str,
    ) -> Result<Option<KbFile>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM kb_files WHERE repo_id = $1 AND path = $2"
        ))
        .bind(repo_id)
        .bind(path)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.as_ref().map(file_from_row).transpose()?)
    }

    async fn insert_file(&mut self, file: NewFile<'_>) -> Result<KbFile, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO kb_files (repo_id, path, commit_sha, sha256) \
             VALUES ($1, $2, $3, $4) RETURNING {FILE_COLUMNS}"
        ))
        .bind(file.repo_id)
        .bind(file.path)
        .bind(file.commit_sha)
        .bind(file.sha256)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(file_from_row(&row)?)
    }

    async fn update_file(
        &mut self,
        id: i64,
        commit_sha: &str,
        sha256: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE kb_files SET commit_sha = $2, sha256 = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(commit_sha)
        .bind(sha256)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_chunks(&mut self, chunks: &[NewChunk<'_>]) -> Result<(), StoreError> {
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO kb_chunks \
                 (repo_id, file_id, path, commit_sha, start_line, end_line, content) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(chunk.repo_id)
            .bind(chunk.file_id)
            .bind(chunk.path)
            .bind(chunk.commit_sha)
            .bind(chunk.start_line)
            .bind(chunk.end_line)
            .bind(chunk.content)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn delete_chunks(&mut self, file_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM kb_chunks WHERE file_id = $1")
            .bind(file_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_file(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kb_files WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn search_terms(
        &mut self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        // websearch_to_tsquery tolerates arbitrary user input and gives
        // quoted phrases + implicit AND semantics.
        let rows = sqlx::query(
            "SELECT c.id, r.owner, r.name, c.path, c.commit_sha, \
                    c.start_line, c.end_line, c.content, \
                    ts_rank_cd(c.content_tsv, websearch_to_tsquery('english', $1)) AS score \
             FROM kb_chunks c \
             JOIN repos r ON r.id = c.repo_id \
             WHERE c.content_tsv @@ websearch_to_tsquery('english', $1) \
             ORDER BY score DESC \
             LIMIT $2",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| retrieved_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn search_any_term(
        &mut self,
        terms: &[String],
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        // Terms are pre-sanitized to [A-Za-z0-9_]+, so the OR expression is
        // safe for to_tsquery.
        let tsquery = terms.join(" | ");
        let rows = sqlx::query(
            "SELECT c.id, r.owner, r.name, c.path, c.commit_sha, \
                    c.start_line, c.end_line, c.content, \
                    ts_rank_cd(c.content_tsv, to_tsquery('english', $1)) AS score \
             FROM kb_chunks c \
             JOIN repos r ON r.id = c.repo_id \
             WHERE c.content_tsv @@ to_tsquery('english', $1) \
             ORDER BY score DESC \
             LIMIT $2",
        )
        .bind(tsquery)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| retrieved_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn search_paths(
        &mut self,
        query: &str,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        // Similarity is computed against kb_files.path, which carries the
        // trigram index; kb_chunks.path would force a full scan.
        let rows = sqlx::query(
            "SELECT c.id, r.owner, r.name, c.path, c.commit_sha, \
                    c.start_line, c.end_line, c.content, \
                    similarity(f.path, $1) AS score \
             FROM kb_chunks c \
             JOIN kb_files f ON f.id = c.file_id \
             JOIN repos r ON r.id = c.repo_id \
             WHERE similarity(f.path, $1) > $2 \
             ORDER BY score DESC \
             LIMIT $3",
        )
        .bind(query)
        .bind(threshold)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| retrieved_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn has_chunks(&mut self) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM kb_chunks) AS present")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.try_get("present")?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
