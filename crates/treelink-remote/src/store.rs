//! The `RemoteStore` trait: the remote version-controlled store reduced to
//! the operations the sync engine consumes.
//!
//! Every mutation is a compare-and-swap primitive. A write or delete carries
//! the last-known version token for the path; the store rejects the request
//! with `SyncError::VersionMismatch` when the token no longer matches its
//! current version. A `None` token on `write_file` means first-write: the
//! path must not exist yet.

use async_trait::async_trait;
use bytes::Bytes;
use treelink_core::types::{RemoteEntry, RepoId};
use treelink_core::SyncResult;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the direct children of `path` on `branch` (single level).
    ///
    /// `path` is empty for the repository root. Returns
    /// `Err(SyncError::NotFound)` when the directory does not exist.
    async fn list_dir(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> SyncResult<Vec<RemoteEntry>>;

    /// Fetch raw file content through the opaque handle of a `RemoteEntry`.
    async fn fetch_content(&self, repo: &RepoId, handle: &str) -> SyncResult<Bytes>;

    /// Create or update a file; returns the new version token.
    ///
    /// `expected_version = None` is a first-write and fails with
    /// `VersionMismatch` if the path already exists. `Some(token)` is a CAS
    /// update and fails with `VersionMismatch` if `token` is stale.
    async fn write_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: Bytes,
        expected_version: Option<&str>,
    ) -> SyncResult<String>;

    /// Delete a file, guarded by its version token.
    async fn delete_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        expected_version: &str,
    ) -> SyncResult<()>;

    /// List branch names.
    async fn list_branches(&self, repo: &RepoId) -> SyncResult<Vec<String>>;

    /// Head version of a branch; `Err(SyncError::BranchNotFound)` if absent.
    async fn branch_head(&self, repo: &RepoId, branch: &str) -> SyncResult<String>;

    /// Create a branch ref pointing at `from_version`.
    async fn create_branch(&self, repo: &RepoId, name: &str, from_version: &str)
        -> SyncResult<()>;
}

// A shared handle is a store. Lets an owner (the orchestrator) and an
// observer (tests, tooling) work against the same instance.
#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    async fn list_dir(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> SyncResult<Vec<RemoteEntry>> {
        (**self).list_dir(repo, branch, path).await
    }

    async fn fetch_content(&self, repo: &RepoId, handle: &str) -> SyncResult<Bytes> {
        (**self).fetch_content(repo, handle).await
    }

    async fn write_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: Bytes,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        (**self)
            .write_file(repo, branch, path, content, expected_version)
            .await
    }

    async fn delete_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        expected_version: &str,
    ) -> SyncResult<()> {
        (**self)
            .delete_file(repo, branch, path, expected_version)
            .await
    }

    async fn list_branches(&self, repo: &RepoId) -> SyncResult<Vec<String>> {
        (**self).list_branches(repo).await
    }

    async fn branch_head(&self, repo: &RepoId, branch: &str) -> SyncResult<String> {
        (**self).branch_head(repo, branch).await
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        name: &str,
        from_version: &str,
    ) -> SyncResult<()> {
        (**self).create_branch(repo, name, from_version).await
    }
}
