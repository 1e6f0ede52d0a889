//! Integration tests: orchestrator lifecycle, state machine, and resolution
//! against an in-memory remote.

use bytes::Bytes;
use std::time::Duration;

use treelink_core::config::{ConflictMode, SyncSettings};
use treelink_core::types::{
    ConflictKind, ConflictResolution, FileTree, RepoId, Resolution, SyncPhase,
};
use treelink_core::SyncError;
use treelink_remote::memory::MemRemote;
use treelink_sync::SyncOrchestrator;

fn repo() -> RepoId {
    RepoId::new("acme", "webapp")
}

fn settings() -> SyncSettings {
    SyncSettings {
        real_time_sync_enabled: false,
        ..SyncSettings::default()
    }
}

fn orchestrator() -> SyncOrchestrator<MemRemote> {
    SyncOrchestrator::new(MemRemote::with_branch("main"), settings())
}

fn tree(files: &[(&str, &str)]) -> FileTree {
    let mut tree = FileTree::new();
    for (path, content) in files {
        tree.insert(path, content.to_string());
    }
    tree
}

#[tokio::test]
async fn connect_sets_status_and_requires_real_branch() {
    let orch = orchestrator();

    let err = orch.connect(repo(), "no-such-branch").await.unwrap_err();
    assert!(matches!(err, SyncError::BranchNotFound(_)));
    let status = orch.status().await;
    assert!(!status.connected, "failed connect must not touch state");

    orch.connect(repo(), "main").await.unwrap();
    let status = orch.status().await;
    assert!(status.connected);
    assert_eq!(status.current_branch, "main");
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(status.pending_changes, 0);
    assert!(status.last_sync.is_none());
}

#[tokio::test]
async fn operations_require_connection() {
    let orch = orchestrator();
    assert!(matches!(
        orch.update_local_files(&tree(&[("a.txt", "x")])).await,
        Err(SyncError::NotConnected)
    ));
    assert!(matches!(orch.sync(true).await, Err(SyncError::NotConnected)));
    assert!(matches!(
        orch.switch_branch("main").await,
        Err(SyncError::NotConnected)
    ));
    assert!(matches!(
        orch.resolve_conflicts(Vec::new()).await,
        Err(SyncError::NotConnected)
    ));
}

#[tokio::test]
async fn update_local_files_moves_to_pending() {
    let orch = orchestrator();
    orch.connect(repo(), "main").await.unwrap();

    orch.update_local_files(&tree(&[("a.txt", "hi"), ("src/m.rs", "fn")]))
        .await
        .unwrap();
    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Pending);
    assert_eq!(status.pending_changes, 2);

    orch.update_local_files(&FileTree::new()).await.unwrap();
    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(status.pending_changes, 0);
}

#[tokio::test]
async fn sync_pushes_local_files_and_settles() {
    let store = MemRemote::with_branch("main");
    let orch = SyncOrchestrator::new(store, settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&tree(&[("a.txt", "hi")])).await.unwrap();

    let report = orch.sync(false).await.unwrap();
    assert_eq!(report.synced.len(), 1);
    assert!(report.conflicts.is_empty());
    assert!(report.errors.is_empty());

    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(status.pending_changes, 0);
    assert!(status.last_sync.is_some());

    // A second non-forced sync is skipped entirely
    let again = orch.sync(false).await.unwrap();
    assert!(again.is_clean());
}

#[tokio::test]
async fn remote_only_file_conflicts_and_remote_resolution_restores() {
    let store = MemRemote::with_branch("main");
    store.seed("main", "b.txt", "remote body");
    let orch = SyncOrchestrator::new(store, settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&FileTree::new()).await.unwrap();

    let report = orch.sync(true).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].kind, ConflictKind::Deletion);

    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Conflicted);
    assert_eq!(status.conflicts.len(), 1);

    let issues = orch
        .resolve_conflicts(vec![ConflictResolution {
            conflict: report.conflicts[0].clone(),
            resolution: Resolution::Remote,
        }])
        .await
        .unwrap();
    assert!(issues.is_empty());

    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Synced);
    assert!(status.conflicts.is_empty());
    assert!(status.last_sync.is_some());

    // The restored file is now part of the snapshot: a fresh sync is clean
    let clean = orch.sync(true).await.unwrap();
    assert!(clean.is_clean());
}

#[tokio::test]
async fn stale_remote_change_becomes_content_conflict_then_resolves() {
    use std::sync::Arc;

    let store = Arc::new(MemRemote::with_branch("main"));
    let orch = SyncOrchestrator::new(store.clone(), settings());
    orch.connect(repo(), "main").await.unwrap();

    // First sync records the written version as known
    orch.update_local_files(&tree(&[("c.txt", "v1")])).await.unwrap();
    orch.sync(false).await.unwrap();

    // The remote moves underneath us (a second writer)
    let moved_version = store.seed("main", "c.txt", "v9 from elsewhere");

    // Local edit still carries the now-stale known version
    orch.update_local_files(&tree(&[("c.txt", "v2")])).await.unwrap();
    let write_count_before = store.write_log().len();

    let report = orch.sync(false).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::Content);
    assert_eq!(conflict.local_content, Bytes::from("v2"));
    assert_eq!(conflict.remote_content, Bytes::from("v9 from elsewhere"));
    assert_eq!(conflict.remote_version, moved_version);
    assert_eq!(
        store.write_log().len(),
        write_count_before,
        "no write for a conflicted path"
    );
    assert_eq!(orch.status().await.phase, SyncPhase::Conflicted);

    // Scenario E: local wins; the write carries the conflict's remote version
    let issues = orch
        .resolve_conflicts(vec![ConflictResolution {
            conflict: conflict.clone(),
            resolution: Resolution::Local,
        }])
        .await
        .unwrap();
    assert!(issues.is_empty());

    let last_write = store.write_log().pop().unwrap();
    assert_eq!(last_write.path, "c.txt");
    assert_eq!(last_write.expected.as_deref(), Some(moved_version.as_str()));
    assert_eq!(store.file("main", "c.txt").unwrap().0, Bytes::from("v2"));

    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Synced);
    assert!(status.conflicts.is_empty());
}

#[tokio::test]
async fn failed_resolution_keeps_the_conflict() {
    use std::sync::Arc;

    let store = Arc::new(MemRemote::with_branch("main"));
    store.seed("main", "b.txt", "remote body");
    let orch = SyncOrchestrator::new(store.clone(), settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&FileTree::new()).await.unwrap();

    let report = orch.sync(true).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);

    // The remote moves before the resolution lands: the CAS delete fails
    store.seed("main", "b.txt", "moved again");

    let issues = orch
        .resolve_conflicts(vec![ConflictResolution {
            conflict: report.conflicts[0].clone(),
            resolution: Resolution::Local,
        }])
        .await
        .unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path.as_deref(), Some("b.txt"));

    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Conflicted, "unresolved conflict stays");
    assert_eq!(status.conflicts.len(), 1);
}

#[tokio::test]
async fn switch_branch_failure_leaves_state_untouched() {
    let store = MemRemote::with_branch("main");
    let orch = SyncOrchestrator::new(store, settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&tree(&[("a.txt", "x")])).await.unwrap();
    orch.sync(false).await.unwrap();
    let before = orch.status().await;

    let err = orch.switch_branch("ghost").await.unwrap_err();
    assert!(matches!(err, SyncError::BranchNotFound(_)));

    let after = orch.status().await;
    assert_eq!(after.current_branch, before.current_branch);
    assert_eq!(after.last_sync, before.last_sync);
    assert_eq!(after.phase, before.phase);
}

#[tokio::test]
async fn create_branch_copies_head_and_switches() {
    let store = MemRemote::with_branch("main");
    store.seed("main", "a.txt", "x");
    let orch = SyncOrchestrator::new(store, settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&tree(&[("a.txt", "x")])).await.unwrap();

    let report = orch.create_branch("feature", None).await.unwrap();
    assert!(report.conflicts.is_empty());

    let status = orch.status().await;
    assert_eq!(status.current_branch, "feature");
    assert_eq!(status.phase, SyncPhase::Synced);
}

#[tokio::test]
async fn status_is_a_defensive_copy() {
    let orch = orchestrator();
    orch.connect(repo(), "main").await.unwrap();

    let mut copy = orch.status().await;
    copy.current_branch = "tampered".into();
    copy.pending_changes = 99;

    let fresh = orch.status().await;
    assert_eq!(fresh.current_branch, "main");
    assert_eq!(fresh.pending_changes, 0);
}

#[tokio::test(start_paused = true)]
async fn second_sync_while_in_flight_is_rejected() {
    let store = MemRemote::with_branch("main");
    store.set_latency(Duration::from_millis(100));
    let orch = SyncOrchestrator::new(store, settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&tree(&[("a.txt", "x")])).await.unwrap();

    let background = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.sync(true).await })
    };
    // Let the background sync take the gate and park on the store latency
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = orch.sync(true).await.unwrap_err();
    assert!(matches!(err, SyncError::SyncInFlight));

    let report = background.await.unwrap().unwrap();
    assert_eq!(report.synced.len(), 1);
}

#[tokio::test]
async fn disconnect_resets_everything() {
    let store = MemRemote::with_branch("main");
    store.seed("main", "b.txt", "remote body");
    let orch = SyncOrchestrator::new(store, settings());
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&FileTree::new()).await.unwrap();
    orch.sync(true).await.unwrap();
    assert_eq!(orch.status().await.phase, SyncPhase::Conflicted);

    orch.disconnect().await;
    let status = orch.status().await;
    assert!(!status.connected);
    assert_eq!(status.phase, SyncPhase::Synced);
    assert!(status.conflicts.is_empty());
    assert!(status.last_sync.is_none());
    assert_eq!(status.current_branch, "");
    assert_eq!(status.pending_changes, 0);
}

#[tokio::test]
async fn auto_local_mode_resolves_deletion_by_remote_delete() {
    let store = MemRemote::with_branch("main");
    store.seed("main", "old.txt", "left behind");
    let orch = SyncOrchestrator::new(
        store,
        SyncSettings {
            conflict_mode: ConflictMode::AutoLocal,
            ..settings()
        },
    );
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&FileTree::new()).await.unwrap();

    let report = orch.sync(true).await.unwrap();
    // The report surfaces what was auto-decided
    assert_eq!(report.conflicts.len(), 1);

    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Synced);
    assert!(status.conflicts.is_empty());

    // Local absence won: the remote copy is gone
    let clean = orch.sync(true).await.unwrap();
    assert!(clean.is_clean());
}

#[tokio::test]
async fn auto_remote_mode_restores_remote_files() {
    let store = MemRemote::with_branch("main");
    store.seed("main", "keep.txt", "remote body");
    let orch = SyncOrchestrator::new(
        store,
        SyncSettings {
            conflict_mode: ConflictMode::AutoRemote,
            ..settings()
        },
    );
    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&FileTree::new()).await.unwrap();

    orch.sync(true).await.unwrap();
    let status = orch.status().await;
    assert_eq!(status.phase, SyncPhase::Synced);

    // Remote won: the file is back in the snapshot and the next pass is clean
    let clean = orch.sync(true).await.unwrap();
    assert!(clean.is_clean());
}

#[tokio::test]
async fn status_events_form_the_expected_sequence() {
    let store = MemRemote::with_branch("main");
    let orch = SyncOrchestrator::new(store, settings());
    let mut rx = orch.subscribe_status();

    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&tree(&[("a.txt", "x")])).await.unwrap();
    orch.sync(false).await.unwrap();

    let mut phases = Vec::new();
    while let Ok(status) = rx.try_recv() {
        phases.push((status.connected, status.phase));
    }
    assert_eq!(
        phases,
        vec![
            (true, SyncPhase::Synced),   // connect
            (true, SyncPhase::Pending),  // files supplied
            (true, SyncPhase::Pending),  // sync begins
            (true, SyncPhase::Synced),   // sync settles
        ]
    );
}

#[tokio::test]
async fn progress_events_reach_subscribers() {
    let store = MemRemote::with_branch("main");
    let orch = SyncOrchestrator::new(store, settings());
    let mut rx = orch.subscribe_progress();

    orch.connect(repo(), "main").await.unwrap();
    orch.update_local_files(&tree(&[("a.txt", "x"), ("b.txt", "y")]))
        .await
        .unwrap();
    orch.sync(false).await.unwrap();

    let mut ticks = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        ticks.push(progress);
    }
    assert_eq!(ticks.len(), 2);
    assert!(ticks.iter().all(|t| t.total == 2));
}
