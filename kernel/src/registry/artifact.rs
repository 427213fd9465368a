// Artifact Store Boundary
//
// The registry never touches adapter weights. It only asks the store
// whether a reference points at something real.

use std::path::PathBuf;

use super::StorageRef;

pub trait ArtifactStore: Send + Sync {
    fn resolves(&self, reference: &StorageRef) -> bool;
}

/// Accepts any non-blank reference. Used when weights live outside this process's reach.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaqueArtifactStore;

impl ArtifactStore for OpaqueArtifactStore {
    fn resolves(&self, reference: &StorageRef) -> bool {
        !reference.as_str().trim().is_empty()
    }
}

/// References are paths relative to `root` and must exist on disk.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn resolves(&self, reference: &StorageRef) -> bool {
        !reference.as_str().trim().is_empty() && self.root.join(reference.as_str()).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AdapterRegistry, NewAdapterVersion, StorageError};
    use std::sync::Arc;

    #[test]
    fn opaque_store_rejects_blank_references() {
        assert!(OpaqueArtifactStore.resolves(&StorageRef::new("s3://bucket/adapter")));
        assert!(!OpaqueArtifactStore.resolves(&StorageRef::new("  ")));
    }

    #[test]
    fn local_store_requires_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("adapter_1/final")).unwrap();

        let registry = AdapterRegistry::new(Arc::new(LocalArtifactStore::new(dir.path())));

        registry
            .register(NewAdapterVersion {
                storage_reference: StorageRef::new("adapter_1/final"),
                source_feedback_count: 3,
            })
            .unwrap();

        let err = registry
            .register(NewAdapterVersion {
                storage_reference: StorageRef::new("adapter_2/final"),
                source_feedback_count: 3,
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Unresolvable(_)));
    }
}
