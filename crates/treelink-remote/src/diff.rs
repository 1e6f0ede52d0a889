//! The synchronization diff: compute the minimal set of remote writes plus
//! the set of irreconcilable divergences between a local snapshot and a
//! branch.
//!
//! Classification per path:
//!   - local only            → first-write to remote, recorded in `synced`
//!   - both, identical bytes → no-op, recorded nowhere
//!   - both, differing bytes → CAS write when the local side's last-known
//!     remote version is current (or absent); `Content` conflict when it is
//!     stale
//!   - remote only           → `Deletion` conflict carrying the fetched
//!     remote content and version
//!
//! Per-file fetch/write failures land in `errors` and never abort the
//! remaining paths. A walk failure aborts the whole run. Running the diff
//! twice with no intervening mutation yields an empty report the second
//! time.

use bytes::Bytes;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use treelink_core::types::{
    ConflictKind, LocalFile, RepoId, SyncConflict, SyncIssue, SyncReport, SyncedPath,
};
use treelink_core::SyncResult;

use crate::store::RemoteStore;
use crate::walker::walk_tree;

/// Progress callback type (paths_done, paths_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Run the diff against `branch` and apply the clean writes.
pub async fn diff_and_apply<R: RemoteStore + ?Sized>(
    store: &R,
    repo: &RepoId,
    branch: &str,
    local: &BTreeMap<String, LocalFile>,
    progress: Option<&ProgressFn>,
    cancel: &CancellationToken,
) -> SyncResult<SyncReport> {
    let remote = walk_tree(store, repo, branch, "", cancel).await?;

    let remote_only: Vec<&String> = remote
        .keys()
        .filter(|path| !local.contains_key(*path))
        .collect();
    let total = (local.len() + remote_only.len()) as u64;
    let mut done = 0u64;

    let mut report = SyncReport::default();

    for (path, file) in local {
        done += 1;
        if let Some(cb) = progress {
            cb(done, total, path);
        }

        match remote.get(path) {
            // Absent from remote: first-write, no CAS token.
            None => match store
                .write_file(repo, branch, path, file.content.clone(), None)
                .await
            {
                Ok(version) => {
                    debug!(path = %path, "created remotely");
                    report.synced.push(SyncedPath {
                        path: path.clone(),
                        version,
                    });
                }
                Err(e) => report.errors.push(SyncIssue::for_path(path, e)),
            },
            Some(entry) => {
                let remote_content = match store.fetch_content(repo, &entry.fetch_handle).await {
                    Ok(content) => content,
                    Err(e) => {
                        report.errors.push(SyncIssue::for_path(path, e));
                        continue;
                    }
                };

                if remote_content == file.content {
                    continue;
                }

                let stale = file
                    .known_remote_version
                    .as_deref()
                    .is_some_and(|known| known != entry.version);

                if stale {
                    // Both sides moved since the last sync: hands off.
                    report.conflicts.push(SyncConflict {
                        path: path.clone(),
                        local_content: file.content.clone(),
                        remote_content,
                        local_version: file.known_remote_version.clone(),
                        remote_version: entry.version.clone(),
                        kind: ConflictKind::Content,
                    });
                    continue;
                }

                match store
                    .write_file(
                        repo,
                        branch,
                        path,
                        file.content.clone(),
                        Some(&entry.version),
                    )
                    .await
                {
                    Ok(version) => {
                        debug!(path = %path, "updated remotely");
                        report.synced.push(SyncedPath {
                            path: path.clone(),
                            version,
                        });
                    }
                    // A CAS rejection here is a stale write (the remote moved
                    // between walk and write): an operational failure, not a
                    // locally detected conflict.
                    Err(e) => report.errors.push(SyncIssue::for_path(path, e)),
                }
            }
        }
    }

    for path in remote_only {
        done += 1;
        if let Some(cb) = progress {
            cb(done, total, path);
        }

        let entry = &remote[path];
        match store.fetch_content(repo, &entry.fetch_handle).await {
            Ok(remote_content) => report.conflicts.push(SyncConflict {
                path: path.clone(),
                local_content: Bytes::new(),
                remote_content,
                local_version: None,
                remote_version: entry.version.clone(),
                kind: ConflictKind::Deletion,
            }),
            Err(e) => report.errors.push(SyncIssue::for_path(path, e)),
        }
    }

    info!(
        branch = %branch,
        synced = report.synced.len(),
        conflicts = report.conflicts.len(),
        errors = report.errors.len(),
        "diff complete"
    );
    Ok(report)
}
