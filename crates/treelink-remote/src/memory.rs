//! In-memory `RemoteStore` with full CAS semantics.
//!
//! The test double for everything above the REST seam (the REST client is
//! exercised against a live API; the algorithms are exercised against this).
//! Versions are BLAKE3 content hashes, matching the real store's
//! content-derived tokens. Supports seeding, write/delete logs for
//! assertions, injected per-path failures, and an optional artificial
//! latency for overlap tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use treelink_core::types::{EntryKind, RemoteEntry, RepoId};
use treelink_core::{SyncError, SyncResult};

use crate::store::RemoteStore;

/// One accepted write, recorded for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub path: String,
    pub expected: Option<String>,
    pub version: String,
}

#[derive(Default)]
struct Branch {
    files: BTreeMap<String, Bytes>,
}

#[derive(Default)]
struct MemState {
    branches: HashMap<String, Branch>,
    write_log: Vec<WriteRecord>,
    delete_log: Vec<String>,
    fail_fetch: HashSet<String>,
    fail_write: HashSet<String>,
    fail_list: HashSet<String>,
    latency: Option<Duration>,
}

#[derive(Default)]
pub struct MemRemote {
    inner: Mutex<MemState>,
}

pub fn content_version(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

// Handle layout: "mem://{branch}\u{1f}{path}". The unit separator cannot
// appear in branch names or paths.
fn handle_for(branch: &str, path: &str) -> String {
    format!("mem://{branch}\u{1f}{path}")
}

fn parse_handle(handle: &str) -> SyncResult<(String, String)> {
    handle
        .strip_prefix("mem://")
        .and_then(|rest| rest.split_once('\u{1f}'))
        .map(|(b, p)| (b.to_string(), p.to_string()))
        .ok_or_else(|| SyncError::NotFound(format!("bad handle: {handle}")))
}

impl MemRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with one (empty) branch.
    pub fn with_branch(branch: &str) -> Self {
        let store = Self::new();
        store
            .inner
            .lock()
            .unwrap()
            .branches
            .insert(branch.to_string(), Branch::default());
        store
    }

    /// Seed a file directly, bypassing CAS; returns its version.
    pub fn seed(&self, branch: &str, path: &str, content: impl Into<Bytes>) -> String {
        let content = content.into();
        let version = content_version(&content);
        let mut state = self.inner.lock().unwrap();
        state
            .branches
            .entry(branch.to_string())
            .or_default()
            .files
            .insert(path.to_string(), content);
        version
    }

    /// Remove a file directly, bypassing CAS.
    pub fn remove(&self, branch: &str, path: &str) {
        let mut state = self.inner.lock().unwrap();
        if let Some(b) = state.branches.get_mut(branch) {
            b.files.remove(path);
        }
    }

    /// Current content and version of a file, if present.
    pub fn file(&self, branch: &str, path: &str) -> Option<(Bytes, String)> {
        let state = self.inner.lock().unwrap();
        let content = state.branches.get(branch)?.files.get(path)?.clone();
        let version = content_version(&content);
        Some((content, version))
    }

    /// All file paths on a branch.
    pub fn paths(&self, branch: &str) -> Vec<String> {
        let state = self.inner.lock().unwrap();
        state
            .branches
            .get(branch)
            .map(|b| b.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Accepted writes so far.
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.inner.lock().unwrap().write_log.clone()
    }

    /// Accepted deletes so far.
    pub fn delete_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().delete_log.clone()
    }

    /// Make `fetch_content` fail for this path.
    pub fn fail_fetch_on(&self, path: &str) {
        self.inner.lock().unwrap().fail_fetch.insert(path.to_string());
    }

    /// Make `write_file` fail for this path.
    pub fn fail_write_on(&self, path: &str) {
        self.inner.lock().unwrap().fail_write.insert(path.to_string());
    }

    /// Make `list_dir` fail for this directory path.
    pub fn fail_list_on(&self, path: &str) {
        self.inner.lock().unwrap().fail_list.insert(path.to_string());
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.inner.lock().unwrap();
        state.fail_fetch.clear();
        state.fail_write.clear();
        state.fail_list.clear();
    }

    /// Delay every operation by `latency` (for in-flight overlap tests).
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().unwrap().latency = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.lock().unwrap().latency;
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
    }

    fn head_of(branch: &Branch) -> String {
        let mut hasher = blake3::Hasher::new();
        for (path, content) in &branch.files {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&content_version(content).into_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[async_trait]
impl RemoteStore for MemRemote {
    async fn list_dir(
        &self,
        _repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> SyncResult<Vec<RemoteEntry>> {
        self.simulate_latency().await;
        let state = self.inner.lock().unwrap();
        if state.fail_list.contains(path) {
            return Err(SyncError::Http(format!("injected list failure: {path}")));
        }
        let b = state
            .branches
            .get(branch)
            .ok_or_else(|| SyncError::NotFound(format!("branch {branch}")))?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for (file_path, content) in &b.files {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None => entries.push(RemoteEntry {
                    path: file_path.clone(),
                    kind: EntryKind::File,
                    version: content_version(content),
                    fetch_handle: handle_for(branch, file_path),
                }),
                Some((child, _)) => {
                    dirs.insert(format!("{prefix}{child}"));
                }
            }
        }
        if !path.is_empty() && entries.is_empty() && dirs.is_empty() {
            return Err(SyncError::NotFound(path.to_string()));
        }
        for dir in dirs {
            entries.push(RemoteEntry {
                path: dir.clone(),
                kind: EntryKind::Dir,
                version: content_version(dir.as_bytes()),
                fetch_handle: handle_for(branch, &dir),
            });
        }
        Ok(entries)
    }

    async fn fetch_content(&self, _repo: &RepoId, handle: &str) -> SyncResult<Bytes> {
        self.simulate_latency().await;
        let (branch, path) = parse_handle(handle)?;
        let state = self.inner.lock().unwrap();
        if state.fail_fetch.contains(&path) {
            return Err(SyncError::Http(format!("injected fetch failure: {path}")));
        }
        state
            .branches
            .get(&branch)
            .and_then(|b| b.files.get(&path))
            .cloned()
            .ok_or_else(|| SyncError::NotFound(path))
    }

    async fn write_file(
        &self,
        _repo: &RepoId,
        branch: &str,
        path: &str,
        content: Bytes,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().unwrap();
        if state.fail_write.contains(path) {
            return Err(SyncError::Http(format!("injected write failure: {path}")));
        }
        let b = state
            .branches
            .get_mut(branch)
            .ok_or_else(|| SyncError::NotFound(format!("branch {branch}")))?;

        let current = b.files.get(path).map(|c| content_version(c));
        match (expected_version, current) {
            // First-write: the path must not exist yet.
            (None, Some(_)) => {
                return Err(SyncError::VersionMismatch {
                    path: path.to_string(),
                })
            }
            (None, None) => {}
            (Some(expected), Some(current)) if expected == current => {}
            (Some(_), _) => {
                return Err(SyncError::VersionMismatch {
                    path: path.to_string(),
                })
            }
        }

        let version = content_version(&content);
        b.files.insert(path.to_string(), content);
        let record = WriteRecord {
            path: path.to_string(),
            expected: expected_version.map(|s| s.to_string()),
            version: version.clone(),
        };
        state.write_log.push(record);
        Ok(version)
    }

    async fn delete_file(
        &self,
        _repo: &RepoId,
        branch: &str,
        path: &str,
        expected_version: &str,
    ) -> SyncResult<()> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().unwrap();
        let b = state
            .branches
            .get_mut(branch)
            .ok_or_else(|| SyncError::NotFound(format!("branch {branch}")))?;

        let current = b
            .files
            .get(path)
            .map(|c| content_version(c))
            .ok_or_else(|| SyncError::NotFound(path.to_string()))?;
        if current != expected_version {
            return Err(SyncError::VersionMismatch {
                path: path.to_string(),
            });
        }
        b.files.remove(path);
        state.delete_log.push(path.to_string());
        Ok(())
    }

    async fn list_branches(&self, _repo: &RepoId) -> SyncResult<Vec<String>> {
        self.simulate_latency().await;
        let state = self.inner.lock().unwrap();
        Ok(state.branches.keys().cloned().collect())
    }

    async fn branch_head(&self, _repo: &RepoId, branch: &str) -> SyncResult<String> {
        self.simulate_latency().await;
        let state = self.inner.lock().unwrap();
        state
            .branches
            .get(branch)
            .map(Self::head_of)
            .ok_or_else(|| SyncError::BranchNotFound(branch.to_string()))
    }

    async fn create_branch(
        &self,
        _repo: &RepoId,
        name: &str,
        from_version: &str,
    ) -> SyncResult<()> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().unwrap();
        if state.branches.contains_key(name) {
            return Err(SyncError::Http(format!("reference already exists: {name}")));
        }
        let source = state
            .branches
            .values()
            .find(|b| Self::head_of(b) == from_version)
            .ok_or_else(|| SyncError::NotFound(format!("no branch at version {from_version}")))?;
        let copy = Branch {
            files: source.files.clone(),
        };
        state.branches.insert(name.to_string(), copy);
        Ok(())
    }
}
