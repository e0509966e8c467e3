// The code-host boundary. Three operations cover everything the pipeline
// needs: raw file content at a ref, repo metadata, and the recursive tree
// listing. The GitHub client is the production implementation; the in-memory
// host serves tests and local experiments.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

const API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "archivist";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CodeHostError {
    #[error("code host request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoMetadata {
    pub id: i64,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_owned()
}

#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Raw file content at a ref, or `None` when the host reports 404.
    async fn file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Option<String>, CodeHostError>;

    async fn repo_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata, CodeHostError>;

    /// Every blob path reachable from `reference`, via the recursive tree.
    async fn list_files(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<Vec<String>, CodeHostError>;
}

pub struct GithubClient {
    http: reqwest::Client,
    token: String,
}

impl GithubClient {
    pub fn new(token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to construct http client");
        Self { http, token }
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[async_trait]
impl CodeHost for GithubClient {
    async fn file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Option<String>, CodeHostError> {
        let url = format!("{API_BASE}/repos/{owner}/{repo}/contents/{path}");
        let response = self
            .get(&url, "application/vnd.github.raw+json")
            .query(&[("ref", reference)])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.text().await?))
    }

    async fn repo_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata, CodeHostError> {
        let url = format!("{API_BASE}/repos/{owner}/{repo}");
        let response = self
            .get(&url, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn list_files(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<Vec<String>, CodeHostError> {
        let url = format!("{API_BASE}/repos/{owner}/{repo}/git/trees/{reference}");
        let response = self
            .get(&url, "application/vnd.github+json")
            .query(&[("recursive", "1")])
            .send()
            .await?
            .error_for_status()?;
        let tree: TreeResponse = response.json().await?;
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }
}

/// Test double holding a single repo's worth of files.
pub struct InMemoryCodeHost {
    repo_id: i64,
    default_branch: String,
    files: Mutex<HashMap<String, String>>,
}

impl InMemoryCodeHost {
    pub fn new(repo_id: i64) -> Self {
        Self {
            repo_id,
            default_branch: "main".to_owned(),
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), content.to_owned());
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl CodeHost for InMemoryCodeHost {
    async fn file_content(
        &self,
        _owner: &str,
        _repo: &str,
        path: &str,
        _reference: &str,
    ) -> Result<Option<String>, CodeHostError> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn repo_metadata(
        &self,
        _owner: &str,
        _repo: &str,
    ) -> Result<RepoMetadata, CodeHostError> {
        Ok(RepoMetadata {
            id: self.repo_id,
            default_branch: self.default_branch.clone(),
        })
    }

    async fn list_files(
        &self,
        _owner: &str,
        _repo: &str,
        _reference: &str,
    ) -> Result<Vec<String>, CodeHostError> {
        let mut paths = self
            .files
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        paths.sort();
        Ok(paths)
    }
}
