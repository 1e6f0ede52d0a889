//! treelink-remote: remote store client with REST API binding, tree walker,
//! diff algorithm, and conflict resolution primitives

pub mod diff;
pub mod memory;
pub mod resolve;
pub mod rest;
pub mod store;
pub mod walker;

pub use diff::{diff_and_apply, ProgressFn};
pub use resolve::{apply_resolution, ResolutionOutcome};
pub use rest::RestRemote;
pub use store::RemoteStore;
