//! Shared data model for the sync engine: local snapshot entries, remote
//! tree entries, conflict records, status, and resolution requests.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

// ── Repository identity ───────────────────────────────────────────────────────

/// Owner/name pair identifying a repository on the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ── Local snapshot ────────────────────────────────────────────────────────────

/// One file in the caller-owned local snapshot.
///
/// `known_remote_version` is the remote version token observed the last time
/// this path was synced; `None` means the path has never been pushed from
/// this session. It is the staleness witness of the diff algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: String,
    pub content: Bytes,
    pub known_remote_version: Option<String>,
}

/// A node of the hierarchical tree handed to `update_local_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileNode {
    File { content: Bytes },
    Dir { children: BTreeMap<String, FileNode> },
}

/// Hierarchical file/folder structure with byte content.
///
/// The orchestrator flattens this to a path-keyed map and replaces its
/// snapshot wholesale; there is no incremental patching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    pub entries: BTreeMap<String, FileNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file at a slash-separated path, creating directories on the way.
    pub fn insert(&mut self, path: &str, content: impl Into<Bytes>) {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some((leaf, dirs)) = parts.split_last() else {
            return;
        };

        let mut children = &mut self.entries;
        for dir in dirs {
            let node = children
                .entry(dir.to_string())
                .or_insert_with(|| FileNode::Dir {
                    children: BTreeMap::new(),
                });
            // A file standing where a directory is needed gets replaced.
            if !matches!(node, FileNode::Dir { .. }) {
                *node = FileNode::Dir {
                    children: BTreeMap::new(),
                };
            }
            children = match node {
                FileNode::Dir { children } => children,
                FileNode::File { .. } => unreachable!(),
            };
        }

        children.insert(
            leaf.to_string(),
            FileNode::File {
                content: content.into(),
            },
        );
    }

    /// Flatten to a path → content map, joining nested names with `/`.
    pub fn flatten(&self) -> BTreeMap<String, Bytes> {
        let mut out = BTreeMap::new();
        let mut pending: Vec<(String, &FileNode)> = self
            .entries
            .iter()
            .map(|(name, node)| (name.clone(), node))
            .collect();

        while let Some((path, node)) = pending.pop() {
            match node {
                FileNode::File { content } => {
                    out.insert(path, content.clone());
                }
                FileNode::Dir { children } => {
                    for (name, child) in children {
                        pending.push((format!("{path}/{name}"), child));
                    }
                }
            }
        }
        out
    }
}

// ── Remote tree ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of the remote tree. `version` is the store's content hash for
/// the blob, used as the CAS token on writes. `fetch_handle` is an opaque
/// locator for raw content retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: String,
    pub kind: EntryKind,
    pub version: String,
    pub fetch_handle: String,
}

// ── Conflicts ─────────────────────────────────────────────────────────────────

/// Classification of a divergence between the two replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both sides hold differing content and the local side's last-known
    /// remote version is stale.
    Content,
    /// The remote holds a file the local snapshot does not have.
    Deletion,
    /// Exists locally only. Never produced by the diff algorithm (a
    /// local-only path is a plain create); carried for consumers that
    /// classify all three ways.
    Creation,
}

/// An irreconcilable divergence for one path.
///
/// Immutable once created; resolution consumes it (converting it into a
/// remote write, a remote delete, or a local restore) and removes it from
/// the status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub path: String,
    pub local_content: Bytes,
    pub remote_content: Bytes,
    pub local_version: Option<String>,
    pub remote_version: String,
    pub kind: ConflictKind,
}

/// Which side's state wins when resolving a conflict.
///
/// For `Deletion` conflicts the same rule applies uniformly: `Local` means
/// the local state (absence) wins and the remote copy is deleted; `Remote`
/// means the remote state wins and the file is restored into the local
/// snapshot. `Merged` carries the caller-supplied merged content, so a
/// merged resolution without content is unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
    Merged(Bytes),
}

/// One entry of a batch resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict: SyncConflict,
    pub resolution: Resolution,
}

// ── Sync outcome ──────────────────────────────────────────────────────────────

/// A path written remotely during a sync, with its new version token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedPath {
    pub path: String,
    pub version: String,
}

/// A per-file operational failure captured during diff/apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    pub path: Option<String>,
    pub message: String,
}

impl SyncIssue {
    pub fn for_path(path: impl Into<String>, message: impl ToString) -> Self {
        Self {
            path: Some(path.into()),
            message: message.to_string(),
        }
    }
}

/// Result of one run of the diff algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub conflicts: Vec<SyncConflict>,
    pub synced: Vec<SyncedPath>,
    pub errors: Vec<SyncIssue>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.synced.is_empty() && self.errors.is_empty()
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Synced,
    Pending,
    Conflicted,
    Error,
}

/// Observable state of the orchestrator.
///
/// Invariant: `conflicts` is non-empty iff `phase == Conflicted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub connected: bool,
    pub last_sync: Option<SystemTime>,
    pub pending_changes: usize,
    pub conflicts: Vec<SyncConflict>,
    pub current_branch: String,
    pub phase: SyncPhase,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            connected: false,
            last_sync: None,
            pending_changes: 0,
            conflicts: Vec::new(),
            current_branch: String::new(),
            phase: SyncPhase::Synced,
        }
    }
}
