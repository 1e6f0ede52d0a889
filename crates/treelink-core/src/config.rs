//! Configuration schema (loaded from treelink.toml).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SyncError, SyncResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreelinkConfig {
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote store's REST API
    pub api_base: String,
    /// User-Agent header sent on every request
    pub user_agent: String,
    /// Environment variable holding the bearer credential
    pub token_env: String,
    /// Bounded timeout applied to every HTTP call, in milliseconds
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Auto-sync timer period in milliseconds
    pub auto_sync_interval_ms: u64,
    /// Conflict handling: "manual", "auto-local", or "auto-remote"
    pub conflict_mode: ConflictMode,
    /// Whether the auto-sync timer runs while connected
    pub real_time_sync_enabled: bool,
    /// Ceiling for the auto-sync failure backoff, in milliseconds
    pub max_auto_sync_backoff_ms: u64,
}

/// What happens to conflicts reported by a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    /// Surface conflicts and wait for an explicit resolution batch.
    #[default]
    Manual,
    /// Resolve every conflict with the local side immediately.
    AutoLocal,
    /// Resolve every conflict with the remote side immediately.
    AutoRemote,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            user_agent: "treelink".into(),
            token_env: "TREELINK_TOKEN".into(),
            http_timeout_ms: 30_000,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync_interval_ms: 30_000,
            conflict_mode: ConflictMode::Manual,
            real_time_sync_enabled: false,
            max_auto_sync_backoff_ms: 300_000,
        }
    }
}

impl TreelinkConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: TreelinkConfig = toml::from_str(&text)
            .map_err(|e| SyncError::Config(format!("parsing {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

impl RemoteConfig {
    /// Read the bearer credential from the configured environment variable.
    pub fn token(&self) -> SyncResult<String> {
        std::env::var(&self.token_env).map_err(|_| {
            SyncError::Config(format!("credential env var {} not set", self.token_env))
        })
    }
}
