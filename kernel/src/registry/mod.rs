// Adapter Registry
//
// Versioned, append-only record of trained adapters plus the single
// pointer naming the adapter that serves traffic.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub mod artifact;

pub use artifact::{ArtifactStore, LocalArtifactStore, OpaqueArtifactStore};

/// Monotonic adapter version, starting at 1.
pub type VersionId = u64;

/// Opaque handle resolved by the external artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageRef(pub String);

impl StorageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterVersion {
    pub version_id: VersionId,
    pub created_at: DateTime<Utc>,
    pub source_feedback_count: usize,
    pub storage_reference: StorageRef,
}

/// Metadata for a version that has not been registered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdapterVersion {
    pub storage_reference: StorageRef,
    pub source_feedback_count: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("artifact `{0}` is already registered")]
    DuplicateReference(StorageRef),

    #[error("artifact `{0}` cannot be resolved by the artifact store")]
    Unresolvable(StorageRef),
}

/// Activation referenced a version the registry never recorded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("adapter version {version_id} is not registered")]
pub struct NotFoundError {
    pub version_id: VersionId,
}

#[derive(Debug, Default)]
struct RegistryInner {
    versions: Vec<AdapterVersion>,
    active: Option<VersionId>,
}

/// Properties:
/// - versions are never mutated or removed
/// - `active`, when set, names a registered version
pub struct AdapterRegistry {
    inner: RwLock<RegistryInner>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl AdapterRegistry {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            artifacts,
        }
    }

    /// Append a new version. The active pointer is left alone.
    pub fn register(&self, new_version: NewAdapterVersion) -> Result<AdapterVersion, StorageError> {
        let NewAdapterVersion {
            storage_reference,
            source_feedback_count,
        } = new_version;

        if !self.artifacts.resolves(&storage_reference) {
            return Err(StorageError::Unresolvable(storage_reference));
        }

        let mut inner = self.inner.write();
        if inner
            .versions
            .iter()
            .any(|v| v.storage_reference == storage_reference)
        {
            return Err(StorageError::DuplicateReference(storage_reference));
        }

        let version_id = inner.versions.last().map(|v| v.version_id + 1).unwrap_or(1);
        let version = AdapterVersion {
            version_id,
            created_at: Utc::now(),
            source_feedback_count,
            storage_reference,
        };
        inner.versions.push(version.clone());
        Ok(version)
    }

    /// Point serving traffic at `version_id`.
    pub fn activate(&self, version_id: VersionId) -> Result<AdapterVersion, NotFoundError> {
        let mut inner = self.inner.write();
        let version = inner
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned()
            .ok_or(NotFoundError { version_id })?;

        inner.active = Some(version_id);
        Ok(version)
    }

    pub fn active(&self) -> Option<AdapterVersion> {
        let inner = self.inner.read();
        let id = inner.active?;
        inner.versions.iter().find(|v| v.version_id == id).cloned()
    }

    pub fn active_version_id(&self) -> Option<VersionId> {
        self.inner.read().active
    }

    pub fn get(&self, version_id: VersionId) -> Option<AdapterVersion> {
        self.inner
            .read()
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned()
    }

    pub fn contains(&self, version_id: VersionId) -> bool {
        self.get(version_id).is_some()
    }

    pub fn versions(&self) -> Vec<AdapterVersion> {
        self.inner.read().versions.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new(Arc::new(OpaqueArtifactStore))
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("AdapterRegistry")
            .field("versions", &inner.versions.len())
            .field("active", &inner.active)
            .finish()
    }
}
