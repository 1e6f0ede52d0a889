//! Remote tree walker: flatten a branch to its file entries.
//!
//! Traversal uses an explicit worklist rather than call-stack recursion, so
//! depth is bounded only by heap and the loop stays a natural seat for
//! bounded-concurrency fan-out later. Any listing failure below the root
//! aborts the whole walk; a partial tree is never returned.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use treelink_core::types::{EntryKind, RemoteEntry, RepoId};
use treelink_core::{SyncError, SyncResult};

use crate::store::RemoteStore;

/// Walk `branch` from `root` (empty string for the repository root) and
/// return all file entries keyed by path.
///
/// A `NotFound` on the root listing means an empty tree (the hosted API
/// reports an empty repository that way) and yields an empty map. Any other
/// failure, or `NotFound` deeper in the tree, propagates.
pub async fn walk_tree<R: RemoteStore + ?Sized>(
    store: &R,
    repo: &RepoId,
    branch: &str,
    root: &str,
    cancel: &CancellationToken,
) -> SyncResult<BTreeMap<String, RemoteEntry>> {
    let mut files = BTreeMap::new();
    let mut pending: Vec<String> = vec![root.to_string()];

    while let Some(dir) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let entries = match store.list_dir(repo, branch, &dir).await {
            Ok(entries) => entries,
            Err(SyncError::NotFound(_)) if dir == root => Vec::new(),
            Err(e) => return Err(e),
        };

        for entry in entries {
            match entry.kind {
                EntryKind::Dir => pending.push(entry.path.clone()),
                EntryKind::File => {
                    files.insert(entry.path.clone(), entry);
                }
            }
        }
    }

    debug!(branch = %branch, files = files.len(), "remote tree walked");
    Ok(files)
}
