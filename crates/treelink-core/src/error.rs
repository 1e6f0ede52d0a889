use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Operational failures of the sync engine.
///
/// Detected divergence (content/deletion conflicts) is never an error; it is
/// carried as data in `SyncReport::conflicts`. Everything here is the other
/// channel: network failures, auth rejection, stale CAS tokens, misuse.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http error: {0}")]
    Http(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// CAS rejection: the supplied version token no longer matches the
    /// remote store's current version for this path.
    #[error("stale write token for {path}: remote version changed")]
    VersionMismatch { path: String },

    #[error("not connected to a repository")]
    NotConnected,

    #[error("a sync is already in flight")]
    SyncInFlight,

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether this error is a CAS rejection.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, SyncError::VersionMismatch { .. })
    }
}
