// Turns change events into per-file jobs, enumerates repos for bulk sync,
// and ingests arbitrary web pages as synthetic repo files. The dispatcher
// never consults the denylist for webhook jobs (size is unknown until
// fetch); bulk sync filters by path up front so a fresh sync does not flood
// the queue with junk.

pub mod html;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{error, info};

use crate::db::store::{Session, StoreError};
use crate::github::{CodeHost, CodeHostError};
use crate::indexer::{self, UpsertOutcome};
use crate::queue::{QueueError, TaskQueue};
use crate::repo::denylist::is_denied;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    CodeHost(#[from] CodeHostError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("page fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
}

/// Push event as delivered by the code host's webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    pub repository: EventRepository,
    #[serde(default)]
    pub commits: Vec<EventCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub id: i64,
    pub name: String,
    pub owner: EventOwner,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventOwner {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

fn default_branch() -> String {
    "main".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFilePayload {
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_id: i64,
    pub path: String,
    pub commit_sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFilePayload {
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_id: i64,
    pub path: String,
}

/// Fan a push event out into index/delete jobs, one per changed path.
/// Branch deletions acknowledge with zero jobs: their zero-sha revisions are
/// not content changes.
pub async fn dispatch_push(
    queue: &dyn TaskQueue,
    base_url: &str,
    event: &PushEvent,
) -> Result<usize, QueueError> {
    if event.deleted {
        info!(reference = %event.reference, "skipping branch deletion event");
        return Ok(0);
    }

    let repo = &event.repository;
    let owner = repo
        .owner
        .login
        .clone()
        .or_else(|| repo.owner.name.clone())
        .unwrap_or_default();

    let mut enqueued = 0usize;
    for commit in &event.commits {
        for path in commit.added.iter().chain(commit.modified.iter()) {
            let payload = IndexFilePayload {
                repo_owner: owner.clone(),
                repo_name: repo.name.clone(),
                repo_id: repo.id,
                path: path.clone(),
                commit_sha: event.after.clone(),
            };
            queue
                .enqueue(
                    &format!("{base_url}/tasks/index-file"),
                    serde_json::to_value(&payload)?,
                )
                .await?;
            enqueued += 1;
        }
        for path in &commit.removed {
            let payload = DeleteFilePayload {
                repo_owner: owner.clone(),
                repo_name: repo.name.clone(),
                repo_id: repo.id,
                path: path.clone(),
            };
            queue
                .enqueue(
                    &format!("{base_url}/tasks/delete-file"),
                    serde_json::to_value(&payload)?,
                )
                .await?;
            enqueued += 1;
        }
    }

    info!(
        commits = event.commits.len(),
        tasks_enqueued = enqueued,
        "push event dispatched"
    );
    Ok(enqueued)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: &'static str,
    pub repo_id: i64,
    pub files_found: usize,
    pub tasks_enqueued: usize,
    pub files_skipped_denylist: usize,
}

/// Enumerate every file at `reference` and enqueue an index job for each
/// path the denylist lets through.
pub async fn sync_repo(
    host: &dyn CodeHost,
    queue: &dyn TaskQueue,
    base_url: &str,
    owner: &str,
    repo: &str,
    reference: &str,
) -> Result<SyncReport, IngestError> {
    let metadata = host.repo_metadata(owner, repo).await?;
    let files = host.list_files(owner, repo, reference).await?;

    let mut enqueued = 0usize;
    let mut skipped = 0usize;
    for path in &files {
        if is_denied(path, None) {
            skipped += 1;
            continue;
        }
        let payload = IndexFilePayload {
            repo_owner: owner.to_owned(),
            repo_name: repo.to_owned(),
            repo_id: metadata.id,
            path: path.clone(),
            commit_sha: reference.to_owned(),
        };
        queue
            .enqueue(
                &format!("{base_url}/tasks/index-file"),
                serde_json::to_value(&payload).map_err(QueueError::from)?,
            )
            .await?;
        enqueued += 1;
    }

    info!(
        owner,
        repo,
        files_found = files.len(),
        tasks_enqueued = enqueued,
        files_skipped = skipped,
        "repo sync dispatched"
    );

    Ok(SyncReport {
        status: "accepted",
        repo_id: metadata.id,
        files_found: files.len(),
        tasks_enqueued: enqueued,
        files_skipped_denylist: skipped,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillRepo {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref", default = "default_branch")]
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct BackfillReport {
    pub results: Vec<BackfillRepoResult>,
    pub total_tasks_enqueued: usize,
}

#[derive(Debug, Serialize)]
pub struct BackfillRepoResult {
    pub owner: String,
    pub repo: String,
    pub status: String,
    pub files_found: usize,
    pub tasks_enqueued: usize,
    pub files_skipped_denylist: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sync a batch of repos, isolating failures: one broken repo never blocks
/// the rest.
pub async fn backfill(
    host: &dyn CodeHost,
    queue: &dyn TaskQueue,
    base_url: &str,
    repos: &[BackfillRepo],
) -> BackfillReport {
    let mut results = Vec::with_capacity(repos.len());
    let mut total = 0usize;

    for item in repos {
        match sync_repo(host, queue, base_url, &item.owner, &item.repo, &item.reference).await {
            Ok(report) => {
                total += report.tasks_enqueued;
                results.push(BackfillRepoResult {
                    owner: item.owner.clone(),
                    repo: item.repo.clone(),
                    status: "accepted".to_owned(),
                    files_found: report.files_found,
                    tasks_enqueued: report.tasks_enqueued,
                    files_skipped_denylist: report.files_skipped_denylist,
                    error: None,
                });
            }
            Err(err) => {
                error!(owner = %item.owner, repo = %item.repo, ?err, "backfill repo failed");
                results.push(BackfillRepoResult {
                    owner: item.owner.clone(),
                    repo: item.repo.clone(),
                    status: "error".to_owned(),
                    files_found: 0,
                    tasks_enqueued: 0,
                    files_skipped_denylist: 0,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    BackfillReport {
        results,
        total_tasks_enqueued: total,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlIngestReport {
    pub status: &'static str,
    pub chunks_created: usize,
}

/// Synthetic repo id for ingests with no host id: a SHA-256 prefix of
/// "owner/name" projected into the positive 31-bit range, so the same pair
/// always maps to the same id across restarts.
pub fn synthetic_repo_id(owner: &str, name: &str) -> i64 {
    let digest = Sha256::digest(format!("{owner}/{name}").as_bytes());
    let raw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    i64::from(raw & 0x7fff_ffff)
}

/// Fetch a page, strip it to visible text, and run it through the indexing
/// upsert as if it were a file in a synthetic repo.
pub async fn ingest_url(
    session: &mut dyn Session,
    url: &str,
    repo_owner: &str,
    repo_name: &str,
    path: Option<&str>,
) -> Result<UrlIngestReport, IngestError> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let text = html::extract_text(&body);

    let path = match path {
        Some(p) if !p.is_empty() => p.to_owned(),
        _ => derive_path(url),
    };

    let report = ingest_text(session, repo_owner, repo_name, &path, &text).await?;
    info!(url, path, chunks = report.chunks_created, "url ingested");
    Ok(report)
}

/// The store-side half of URL ingestion, split out so it can run against
/// fakes without a network fetch.
pub async fn ingest_text(
    session: &mut dyn Session,
    repo_owner: &str,
    repo_name: &str,
    path: &str,
    text: &str,
) -> Result<UrlIngestReport, StoreError> {
    let repo = indexer::resolve_repo(
        session,
        synthetic_repo_id(repo_owner, repo_name),
        repo_owner,
        repo_name,
    )
    .await?;

    let content_hash = hex::encode(Sha256::digest(text.as_bytes()));
    let commit_sha = &content_hash[..40];

    Ok(
        match indexer::upsert_content(session, repo.id, path, commit_sha, text).await? {
            UpsertOutcome::Unchanged => UrlIngestReport {
                status: "unchanged",
                chunks_created: 0,
            },
            UpsertOutcome::Indexed { chunks } => UrlIngestReport {
                status: "ingested",
                chunks_created: chunks,
            },
        },
    )
}

fn derive_path(raw_url: &str) -> String {
    url::Url::parse(raw_url)
        .ok()
        .map(|parsed| parsed.path().trim_matches('/').to_owned())
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| "index".to_owned())
}
