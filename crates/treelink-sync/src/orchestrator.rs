//! The sync orchestrator: connection lifecycle, local snapshot, status state
//! machine, and the resolution entry point.
//!
//! All mutable state lives in one record behind a single async mutex, so
//! every transition is serialized. Overlapping sync attempts are rejected,
//! not interleaved: a dedicated gate is `try_lock`-ed on entry and a second
//! `sync()` while one is outstanding returns `SyncError::SyncInFlight`
//! (the auto-sync timer treats that as a benign skip).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use treelink_core::config::{ConflictMode, SyncSettings};
use treelink_core::types::{
    ConflictResolution, FileTree, LocalFile, RepoId, Resolution, SyncIssue, SyncPhase, SyncReport,
    SyncStatus,
};
use treelink_core::{SyncError, SyncResult};
use treelink_remote::diff::{diff_and_apply, ProgressFn};
use treelink_remote::resolve::{apply_resolution, ResolutionOutcome};
use treelink_remote::store::RemoteStore;

use crate::events::{EventBus, Progress};
use crate::scheduler;

struct OrchState {
    repo: Option<RepoId>,
    local_files: BTreeMap<String, LocalFile>,
    /// Remote versions observed at the last successful sync, re-attached to
    /// the snapshot when the caller replaces it wholesale.
    known_versions: HashMap<String, String>,
    status: SyncStatus,
    scheduler: Option<JoinHandle<()>>,
}

impl OrchState {
    fn new() -> Self {
        Self {
            repo: None,
            local_files: BTreeMap::new(),
            known_versions: HashMap::new(),
            status: SyncStatus::default(),
            scheduler: None,
        }
    }
}

struct Inner<R> {
    remote: R,
    settings: SyncSettings,
    state: Mutex<OrchState>,
    /// Single-sync-in-flight gate. Held for the whole duration of `sync()`.
    sync_gate: Mutex<()>,
    events: EventBus,
    /// Cancels in-flight tree walks and the scheduler; replaced on connect.
    cancel: std::sync::Mutex<CancellationToken>,
}

pub struct SyncOrchestrator<R: RemoteStore> {
    inner: Arc<Inner<R>>,
}

impl<R: RemoteStore> Clone for SyncOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: RemoteStore + 'static> SyncOrchestrator<R> {
    pub fn new(remote: R, settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                settings,
                state: Mutex::new(OrchState::new()),
                sync_gate: Mutex::new(()),
                events: EventBus::new(),
                cancel: std::sync::Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn subscribe_status(&self) -> tokio::sync::broadcast::Receiver<SyncStatus> {
        self.inner.events.subscribe_status()
    }

    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<Progress> {
        self.inner.events.subscribe_progress()
    }

    /// Defensive copy of the current status, never a live reference.
    pub async fn status(&self) -> SyncStatus {
        self.inner.state.lock().await.status.clone()
    }

    /// Connect to a repository branch. Verifies the branch head is reachable
    /// before touching any state; starts the auto-sync scheduler when
    /// real-time sync is enabled.
    pub async fn connect(&self, repo: RepoId, branch: &str) -> SyncResult<()> {
        let head = self.inner.remote.branch_head(&repo, branch).await?;
        debug!(repo = %repo, branch = %branch, head = %head, "branch head reachable");

        let cancel = {
            let mut guard = self.inner.cancel.lock().unwrap();
            let fresh = CancellationToken::new();
            let previous = std::mem::replace(&mut *guard, fresh.clone());
            previous.cancel();
            fresh
        };

        {
            let mut st = self.inner.state.lock().await;
            if let Some(handle) = st.scheduler.take() {
                handle.abort();
            }
            *st = OrchState::new();
            st.repo = Some(repo.clone());
            st.status.connected = true;
            st.status.current_branch = branch.to_string();
            if self.inner.settings.real_time_sync_enabled {
                st.scheduler = Some(scheduler::spawn_auto_sync(
                    self.clone(),
                    self.inner.settings.clone(),
                    cancel,
                ));
            }
            self.inner.events.publish_status(&st.status);
        }

        info!(repo = %repo, branch = %branch, "connected");
        Ok(())
    }

    /// Disconnect: cancel in-flight work, stop the scheduler, and reset the
    /// status record and snapshot to defaults.
    pub async fn disconnect(&self) {
        self.inner.cancel.lock().unwrap().cancel();

        let mut st = self.inner.state.lock().await;
        if let Some(handle) = st.scheduler.take() {
            handle.abort();
        }
        *st = OrchState::new();
        self.inner.events.publish_status(&st.status);
        info!("disconnected");
    }

    /// Replace the local snapshot wholesale with a flattened tree.
    ///
    /// Known remote versions from the last sync are re-attached per path.
    /// Conflicts recorded against the previous snapshot are dropped: they
    /// describe contents that no longer exist.
    pub async fn update_local_files(&self, tree: &FileTree) -> SyncResult<()> {
        let flat = tree.flatten();

        let mut st = self.inner.state.lock().await;
        if !st.status.connected {
            return Err(SyncError::NotConnected);
        }

        let mut files = BTreeMap::new();
        for (path, content) in flat {
            let known = st.known_versions.get(&path).cloned();
            files.insert(
                path.clone(),
                LocalFile {
                    path,
                    content,
                    known_remote_version: known,
                },
            );
        }
        st.local_files = files;
        st.status.pending_changes = st.local_files.len();
        st.status.conflicts.clear();
        st.status.phase = if st.status.pending_changes > 0 {
            SyncPhase::Pending
        } else {
            SyncPhase::Synced
        };
        self.inner.events.publish_status(&st.status);
        Ok(())
    }

    /// Run one synchronization pass.
    ///
    /// With `force = false` the pass is skipped (empty report) when nothing
    /// is pending and the branch has been synced before. A second call while
    /// a pass is in flight returns `SyncError::SyncInFlight`.
    pub async fn sync(&self, force: bool) -> SyncResult<SyncReport> {
        let _gate = self
            .inner
            .sync_gate
            .try_lock()
            .map_err(|_| SyncError::SyncInFlight)?;

        let (repo, branch, local) = {
            let mut st = self.inner.state.lock().await;
            let Some(repo) = st.repo.clone() else {
                return Err(SyncError::NotConnected);
            };
            if !force && st.status.pending_changes == 0 && st.status.last_sync.is_some() {
                debug!("nothing pending, sync skipped");
                return Ok(SyncReport::default());
            }
            st.status.phase = SyncPhase::Pending;
            st.status.conflicts.clear();
            self.inner.events.publish_status(&st.status);
            (
                repo,
                st.status.current_branch.clone(),
                st.local_files.clone(),
            )
        };

        let cancel = self.inner.cancel.lock().unwrap().clone();
        let events = self.inner.events.clone();
        let progress: ProgressFn = Box::new(move |done, total, message| {
            events.publish_progress(Progress {
                done,
                total,
                message: message.to_string(),
            });
        });

        let result = diff_and_apply(
            &self.inner.remote,
            &repo,
            &branch,
            &local,
            Some(&progress),
            &cancel,
        )
        .await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                let mut st = self.inner.state.lock().await;
                // A disconnect may have reset the state while the diff was
                // in flight; leave the reset state alone.
                if st.status.connected {
                    st.status.phase = SyncPhase::Error;
                    st.status.conflicts.clear();
                    self.inner.events.publish_status(&st.status);
                }
                return Err(e);
            }
        };

        {
            let mut st = self.inner.state.lock().await;
            if !st.status.connected {
                return Ok(report);
            }
            for synced in &report.synced {
                st.known_versions
                    .insert(synced.path.clone(), synced.version.clone());
                if let Some(file) = st.local_files.get_mut(&synced.path) {
                    file.known_remote_version = Some(synced.version.clone());
                }
            }
            st.status.last_sync = Some(SystemTime::now());
            st.status.conflicts = report.conflicts.clone();
            if report.conflicts.is_empty() {
                st.status.phase = SyncPhase::Synced;
                st.status.pending_changes = 0;
            } else {
                st.status.phase = SyncPhase::Conflicted;
            }
            self.inner.events.publish_status(&st.status);
        }

        // Auto-resolution consumes the reported conflicts immediately; the
        // report still lists them so callers see what was decided for them.
        if !report.conflicts.is_empty() {
            let side = match self.inner.settings.conflict_mode {
                ConflictMode::Manual => None,
                ConflictMode::AutoLocal => Some(Resolution::Local),
                ConflictMode::AutoRemote => Some(Resolution::Remote),
            };
            if let Some(side) = side {
                let batch: Vec<ConflictResolution> = report
                    .conflicts
                    .iter()
                    .map(|conflict| ConflictResolution {
                        conflict: conflict.clone(),
                        resolution: side.clone(),
                    })
                    .collect();
                let issues = self.resolve_conflicts(batch).await?;
                for issue in issues {
                    warn!(path = ?issue.path, error = %issue.message, "auto-resolution failed");
                }
            }
        }

        Ok(report)
    }

    /// Apply a batch of resolutions.
    ///
    /// Each entry is applied independently; failures are returned as issues
    /// and leave their conflict in place. When every conflict is gone the
    /// status transitions to `Synced` with a fresh `last_sync`.
    pub async fn resolve_conflicts(
        &self,
        batch: Vec<ConflictResolution>,
    ) -> SyncResult<Vec<SyncIssue>> {
        let (repo, branch) = {
            let st = self.inner.state.lock().await;
            let Some(repo) = st.repo.clone() else {
                return Err(SyncError::NotConnected);
            };
            (repo, st.status.current_branch.clone())
        };

        let mut issues = Vec::new();
        for entry in batch {
            let applied = apply_resolution(
                &self.inner.remote,
                &repo,
                &branch,
                &entry.conflict,
                &entry.resolution,
            )
            .await;

            let mut st = self.inner.state.lock().await;
            match applied {
                Ok(ResolutionOutcome::WroteRemote {
                    path,
                    version,
                    content,
                })
                | Ok(ResolutionOutcome::RestoredLocal {
                    path,
                    version,
                    content,
                }) => {
                    st.known_versions.insert(path.clone(), version.clone());
                    st.local_files.insert(
                        path.clone(),
                        LocalFile {
                            path: path.clone(),
                            content,
                            known_remote_version: Some(version),
                        },
                    );
                    st.status.conflicts.retain(|c| c.path != path);
                }
                Ok(ResolutionOutcome::DeletedRemote { path }) => {
                    st.known_versions.remove(&path);
                    st.local_files.remove(&path);
                    st.status.conflicts.retain(|c| c.path != path);
                }
                Err(e) => {
                    warn!(path = %entry.conflict.path, error = %e, "resolution failed");
                    issues.push(SyncIssue::for_path(&entry.conflict.path, e));
                }
            }
        }

        let mut st = self.inner.state.lock().await;
        if st.status.connected {
            if st.status.conflicts.is_empty() {
                st.status.phase = SyncPhase::Synced;
                st.status.pending_changes = 0;
                st.status.last_sync = Some(SystemTime::now());
            } else {
                st.status.phase = SyncPhase::Conflicted;
            }
            self.inner.events.publish_status(&st.status);
        }
        Ok(issues)
    }

    /// Switch to another branch and immediately sync it.
    ///
    /// The branch lookup happens before any state is touched; a failed
    /// lookup leaves everything unmodified. On success `last_sync` is
    /// cleared so the branch is treated as unseen.
    pub async fn switch_branch(&self, branch: &str) -> SyncResult<SyncReport> {
        let repo = {
            let st = self.inner.state.lock().await;
            let Some(repo) = st.repo.clone() else {
                return Err(SyncError::NotConnected);
            };
            repo
        };

        self.inner.remote.branch_head(&repo, branch).await?;

        {
            let mut st = self.inner.state.lock().await;
            st.status.current_branch = branch.to_string();
            st.status.last_sync = None;
            st.known_versions.clear();
            for file in st.local_files.values_mut() {
                file.known_remote_version = None;
            }
            self.inner.events.publish_status(&st.status);
        }

        info!(branch = %branch, "switched branch");
        self.sync(true).await
    }

    /// Create a branch from `from` (default: the current branch) and switch
    /// to it.
    pub async fn create_branch(&self, name: &str, from: Option<&str>) -> SyncResult<SyncReport> {
        let (repo, current) = {
            let st = self.inner.state.lock().await;
            let Some(repo) = st.repo.clone() else {
                return Err(SyncError::NotConnected);
            };
            (repo, st.status.current_branch.clone())
        };

        let source = from.unwrap_or(&current);
        let head = self.inner.remote.branch_head(&repo, source).await?;
        self.inner.remote.create_branch(&repo, name, &head).await?;
        info!(branch = %name, from = %source, "branch created");

        self.switch_branch(name).await
    }
}
