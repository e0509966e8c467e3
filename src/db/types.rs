// Row types for the knowledge base. A repo owns its files, a file owns its
// chunks, and deletes cascade downward.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Repo {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KbFile {
    pub id: i64,
    pub repo_id: i64,
    pub path: String,
    /// Revision the current content reflects. Informational only; change
    /// detection goes through `sha256`.
    pub commit_sha: String,
    /// Hex SHA-256 of the UTF-8 content bytes.
    pub sha256: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KbChunk {
    pub id: i64,
    pub repo_id: i64,
    pub file_id: i64,
    pub path: String,
    pub commit_sha: String,
    pub start_line: i32,
    pub end_line: i32,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct NewRepo<'a> {
    pub id: i64,
    pub owner: &'a str,
    pub name: &'a str,
    pub default_branch: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
    pub repo_id: i64,
    pub path: &'a str,
    pub commit_sha: &'a str,
    pub sha256: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct NewChunk<'a> {
    pub repo_id: i64,
    pub file_id: i64,
    pub path: &'a str,
    pub commit_sha: &'a str,
    pub start_line: i32,
    pub end_line: i32,
    pub content: &'a str,
}

/// Projection returned by the retrieval queries, carrying everything a
/// citation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: i64,
    pub repo_owner: String,
    pub repo_name: String,
    pub path: String,
    pub commit_sha: String,
    pub start_line: i32,
    pub end_line: i32,
    pub content: String,
    pub score: f32,
}

impl RetrievedChunk {
    /// The stable, user-visible citation string for this chunk.
    pub fn source(&self) -> String {
        format!(
            "{}/{}/{}@{}:{}-{}",
            self.repo_owner,
            self.repo_name,
            self.path,
            self.commit_sha,
            self.start_line,
            self.end_line
        )
    }
}
