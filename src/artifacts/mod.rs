// Generated-app artifacts: snapshots and their durable store

pub mod snapshot;
pub mod store;

pub use snapshot::{validate_relative_path, FileSnapshot, SnapshotFile};
pub use store::{ArtifactStore, FsArtifactStore, VersionMeta};
