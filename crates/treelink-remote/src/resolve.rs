//! Conflict resolution: convert a conflict plus a chosen side into a remote
//! CAS operation or a local restore instruction.
//!
//! The polarity is uniform across conflict kinds: a resolution names the
//! side whose state wins.
//!
//!   - `Content` (both sides hold differing content): always a CAS write of
//!     the chosen content, tokened by the conflict's remote version.
//!   - `Deletion` (remote holds a file the local snapshot lacks):
//!     `Local` wins means the absence wins, so the remote copy is CAS-deleted;
//!     `Remote` wins means the file is restored into the local snapshot and
//!     the remote is untouched; `Merged` writes the merged content remotely
//!     and restores it locally.
//!
//! The returned outcome tells the orchestrator how to update its snapshot.
//! Conflict records are consumed whole; they are never mutated in place.

use bytes::Bytes;
use tracing::debug;

use treelink_core::types::{ConflictKind, RepoId, Resolution, SyncConflict};
use treelink_core::SyncResult;

use crate::store::RemoteStore;

/// Snapshot-update instruction produced by applying one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The chosen content was written remotely; the local snapshot should
    /// hold `content` at `path` with `version` as its known remote version.
    WroteRemote {
        path: String,
        version: String,
        content: Bytes,
    },
    /// The remote copy was deleted; the path stays absent locally.
    DeletedRemote { path: String },
    /// The remote side won a deletion conflict; the file re-enters the local
    /// snapshot unchanged on the remote.
    RestoredLocal {
        path: String,
        version: String,
        content: Bytes,
    },
}

/// Apply one resolution against the remote store.
pub async fn apply_resolution<R: RemoteStore + ?Sized>(
    store: &R,
    repo: &RepoId,
    branch: &str,
    conflict: &SyncConflict,
    resolution: &Resolution,
) -> SyncResult<ResolutionOutcome> {
    match conflict.kind {
        ConflictKind::Content | ConflictKind::Creation => {
            let content = match resolution {
                Resolution::Local => conflict.local_content.clone(),
                Resolution::Remote => conflict.remote_content.clone(),
                Resolution::Merged(merged) => merged.clone(),
            };
            // Creation-kind records have no remote counterpart to swap against.
            let token = match conflict.kind {
                ConflictKind::Creation => None,
                _ => Some(conflict.remote_version.as_str()),
            };
            let version = store
                .write_file(repo, branch, &conflict.path, content.clone(), token)
                .await?;
            debug!(path = %conflict.path, version = %version, "conflict resolved by write");
            Ok(ResolutionOutcome::WroteRemote {
                path: conflict.path.clone(),
                version,
                content,
            })
        }
        ConflictKind::Deletion => match resolution {
            Resolution::Local => {
                store
                    .delete_file(repo, branch, &conflict.path, &conflict.remote_version)
                    .await?;
                debug!(path = %conflict.path, "conflict resolved by remote delete");
                Ok(ResolutionOutcome::DeletedRemote {
                    path: conflict.path.clone(),
                })
            }
            Resolution::Remote => {
                debug!(path = %conflict.path, "conflict resolved by local restore");
                Ok(ResolutionOutcome::RestoredLocal {
                    path: conflict.path.clone(),
                    version: conflict.remote_version.clone(),
                    content: conflict.remote_content.clone(),
                })
            }
            Resolution::Merged(merged) => {
                let version = store
                    .write_file(
                        repo,
                        branch,
                        &conflict.path,
                        merged.clone(),
                        Some(conflict.remote_version.as_str()),
                    )
                    .await?;
                debug!(path = %conflict.path, version = %version, "conflict resolved by merged write");
                Ok(ResolutionOutcome::RestoredLocal {
                    path: conflict.path.clone(),
                    version,
                    content: merged.clone(),
                })
            }
        },
    }
}
