// In-memory store with the same unit-of-work semantics as Postgres: a
// session clones the tables, works on the clone, and swaps it back on
// commit. Dropping a session uncommitted discards its writes. The retrieval
// queries are evaluated in Rust: verbatim token matching (no stemming) with
// a minimal-cover density score, and pg_trgm style trigram similarity over
// file paths.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::store::{Session, Store, StoreError};
use super::types::{KbChunk, KbFile, NewChunk, NewFile, NewRepo, Repo, RetrievedChunk};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

#[derive(Debug, Default, Clone)]
struct Tables {
    repos: Vec<Repo>,
    files: Vec<KbFile>,
    chunks: Vec<KbChunk>,
    last_file_id: i64,
    last_chunk_id: i64,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        let work = self.inner.lock().unwrap().clone();
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.inner),
            work,
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemorySession {
    shared: Arc<Mutex<Tables>>,
    work: Tables,
}

#[async_trait]
impl Session for MemorySession {
    async fn repo_by_id(&mut self, id: i64) -> Result<Option<Repo>, StoreError> {
        Ok(self.work.repos.iter().find(|r| r.id == id).cloned())
    }

    async fn repo_by_owner_name(
        &mut self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repo>, StoreError> {
        Ok(self
            .work
            .repos
            .iter()
            .find(|r| r.owner == owner && r.name == name)
            .cloned())
    }

    async fn insert_repo(&mut self, repo: NewRepo<'_>) -> Result<Repo, StoreError> {
        if self.work.repos.iter().any(|r| r.id == repo.id) {
            return Err(StoreError::Constraint(format!(
                "repos.id duplicate: {}",
                repo.id
            )));
        }
        if self
            .work
            .repos
            .iter()
            .any(|r| r.owner == repo.owner && r.name == repo.name)
        {
            return Err(StoreError::Constraint(format!(
                "uq_repos_owner_name duplicate: {}/{}",
                repo.owner, repo.name
            )));
        }
        let row = Repo {
            id: repo.id,
            owner: repo.owner.to_owned(),
            name: repo.name.to_owned(),
            default_branch: repo.default_branch.to_owned(),
            updated_at: Utc::now(),
        };
        self.work.repos.push(row.clone());
        Ok(row)
    }

    async fn file_by_path(
        &mut self,
        repo_id: i64,
        path: &str,
    ) -> Result<Option<KbFile>, StoreError> {
        Ok(self
            .work
            .files
            .iter()
            .find(|f| f.repo_id == repo_id && f.path == path)
            .cloned())
    }

    async fn insert_file(&mut self, file: NewFile<'_>) -> Result<KbFile, StoreError> {
        if self
            .work
            .files
            .iter()
            .any(|f| f.repo_id == file.repo_id && f.path == file.path)
        {
            return Err(StoreError::Constraint(format!(
                "uq_kb_files_repo_path duplicate: {}:{}",
                file.repo_id, file.path
            )));
        }
        self.work.last_file_id += 1;
        let row = KbFile {
            id: self.work.last_file_id,
            repo_id: file.repo_id,
            path: file.path.to_owned(),
            commit_sha: file.commit_sha.to_owned(),
            sha256: file.sha256.to_owned(),
            updated_at: Utc::now(),
        };
        self.work.files.push(row.clone());
        Ok(row)
    }

    async fn update_file(
        &mut self,
        id: i64,
        commit_sha: &str,
        sha256: &str,
    ) -> Result<(), StoreError> {
        if let Some(file) = self.work.files.iter_mut().find(|f| f.id == id) {
            file.commit_sha = commit_sha.to_owned();
            file.sha256 = sha256.to_owned();
            file.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_chunks(&mut self, chunks: &[NewChunk<'_>]) -> Result<(), StoreError> {
        for chunk in chunks {
            self.work.last_chunk_id += 1;
            self.work.chunks.push(KbChunk {
                id: self.work.last_chunk_id,
                repo_id: chunk.repo_id,
                file_id: chunk.file_id,
                path: chunk.path.to_owned(),
                commit_sha: chunk.commit_sha.to_owned(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                content: chunk.content.to_owned(),
            });
        }
        Ok(())
    }

    async fn delete_chunks(&mut self, file_id: i64) -> Result<u64, StoreError> {
        let before = self.work.chunks.len();
        self.work.chunks.retain(|c| c.file_id != file_id);
        Ok((before - self.work.chunks.len()) as u64)
    }

    async fn delete_file(&mut self, id: i64) -> Result<(), StoreError> {
        self.work.chunks.retain(|c| c.file_id != id);
        self.work.files.retain(|f| f.id != id);
        Ok(())
    }

    async fn search_terms(
        &mut self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let terms = parse_query(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for chunk in &self.work.chunks {
            let doc = tokens(&chunk.content);
            let lists = terms
                .iter()
                .map(|term| term_positions(term, &doc))
                .collect::<Vec<_>>();
            if lists.iter().any(Vec::is_empty) {
                continue;
            }
            hits.push((cover_density(&lists), chunk));
        }
        Ok(self.ranked(hits, limit))
    }

    async fn search_any_term(
        &mut self,
        terms: &[String],
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let terms = terms
            .iter()
            .map(|t| Term::Word(t.to_lowercase()))
            .collect::<Vec<_>>();
        let mut hits = Vec::new();
        for chunk in &self.work.chunks {
            let doc = tokens(&chunk.content);
            let lists = terms
                .iter()
                .map(|term| term_positions(term, &doc))
                .filter(|list| !list.is_empty())
                .collect::<Vec<_>>();
            if lists.is_empty() {
                continue;
            }
            hits.push((cover_density(&lists), chunk));
        }
        Ok(self.ranked(hits, limit))
    }

    async fn search_paths(
        &mut self,
        query: &str,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let mut hits = Vec::new();
        for file in &self.work.files {
            let score = trigram_similarity(&file.path, query);
            if score <= threshold {
                continue;
            }
            for chunk in self.work.chunks.iter().filter(|c| c.file_id == file.id) {
                hits.push((score, chunk));
            }
        }
        Ok(self.ranked(hits, limit))
    }

    async fn has_chunks(&mut self) -> Result<bool, StoreError> {
        Ok(!self.work.chunks.is_empty())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySession { shared, work } = *self;
        *shared.lock().unwrap() = work;
        Ok(())
    }
}

impl MemorySession {
    /// Highest score first, chunk id as the tiebreak, capped at `limit`.
    fn ranked(&self, mut hits: Vec<(f32, &KbChunk)>, limit: i64) -> Vec<RetrievedChunk> {
        hits.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        hits.truncate(limit.max(0) as usize);
        hits.into_iter()
            .filter_map(|(score, chunk)| {
                let repo = self.work.repos.iter().find(|r| r.id == chunk.repo_id)?;
                Some(RetrievedChunk {
                    id: chunk.id,
                    repo_owner: repo.owner.clone(),
                    repo_name: repo.name.clone(),
                    path: chunk.path.clone(),
                    commit_sha: chunk.commit_sha.clone(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    content: chunk.content.clone(),
                    score,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Word(String),
    Phrase(Vec<String>),
}

fn tokens(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Quoted segments become phrase terms, everything else word terms. Matching
/// is verbatim on lowercased tokens.
fn parse_query(query: &str) -> Vec<Term> {
    let mut terms = Vec::new();
    for (i, segment) in query.split('"').enumerate() {
        if i % 2 == 1 {
            let words = tokens(segment);
            match words.len() {
                0 => {}
                1 => terms.push(Term::Word(words.into_iter().next().unwrap())),
                _ => terms.push(Term::Phrase(words)),
            }
        } else {
            terms.extend(tokens(segment).into_iter().map(Term::Word));
        }
    }
    terms
}

/// Token positions where the term matches; a phrase matches at the position
/// of its first word.
fn term_positions(term: &Term, doc: &[String]) -> Vec<usize> {
    match term {
        Term::Word(word) => doc
            .iter()
            .enumerate()
            .filter(|(_, token)| *token == word)
            .map(|(i, _)| i)
            .collect(),
        Term::Phrase(words) => {
            if words.len() > doc.len() {
                return Vec::new();
            }
            doc.windows(words.len())
                .enumerate()
                .filter(|(_, window)| window.iter().zip(words).all(|(a, b)| a == b))
                .map(|(i, _)| i)
                .collect()
        }
    }
}

/// Cover-density score: every minimal token window containing all terms
/// contributes 0.1 / width, so adjacent terms outrank scattered ones. A
/// single term scores 0.1 per occurrence.
fn cover_density(position_lists: &[Vec<usize>]) -> f32 {
    let term_count = position_lists.len();
    let mut events = Vec::new();
    for (term, list) in position_lists.iter().enumerate() {
        for &pos in list {
            events.push((pos, term));
        }
    }
    events.sort_unstable();

    let mut counts = vec![0usize; term_count];
    let mut covered = 0usize;
    let mut left = 0usize;
    let mut rank = 0.0f32;

    for right in 0..events.len() {
        let (_, term) = events[right];
        counts[term] += 1;
        if counts[term] == 1 {
            covered += 1;
        }
        while covered == term_count {
            let (left_pos, left_term) = events[left];
            if counts[left_term] > 1 {
                counts[left_term] -= 1;
                left += 1;
                continue;
            }
            // [left, right] is a minimal cover.
            let width = events[right].0 - left_pos + 1;
            rank += 0.1 / width as f32;
            counts[left_term] -= 1;
            covered -= 1;
            left += 1;
        }
    }
    rank
}

/// pg_trgm compatible similarity: lowercase, split into alphanumeric words,
/// pad each with two leading and one trailing space, then compare trigram
/// sets by intersection over union.
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    let (set_a, set_b) = (trigram_set(a), trigram_set(b));
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - shared;
    shared as f32 / union as f32
}

fn trigram_set(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    let mut set = HashSet::new();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded = format!("  {word} ").chars().collect::<Vec<_>>();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}
