// Model Serving State Machine
//
// Tracks model readiness and the adapter currently mounted.
// The status/adapter pair is published under one lock so readers
// never see a ready model paired with a half-swapped adapter.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::registry::{AdapterRegistry, AdapterVersion, NotFoundError, VersionId};

pub mod loader;

pub use loader::{LoadError, ModelLoader, NoopModelLoader};

/// Readiness of the serving model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServingStatus {
    /// Nothing loaded; generation must be refused.
    Unloaded,

    /// Base model or adapter is being (re)loaded.
    Loading,

    /// Serving with `active_adapter` mounted.
    Ready,
}

/// Commands accepted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingTransition {
    BeginLoading,
    Loaded,
    LoadFailed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("illegal state transition: {0}")]
    IllegalTransition(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SwapError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

/// Pure transition table.
pub fn next_status(
    current: ServingStatus,
    transition: ServingTransition,
) -> Result<ServingStatus, StateError> {
    use ServingStatus::*;
    use ServingTransition::*;

    match (current, transition) {
        (Unloaded | Ready, BeginLoading) => Ok(Loading),
        (Loading, Loaded) => Ok(Ready),
        (Loading, LoadFailed) => Ok(Unloaded),
        (state, cmd) => Err(StateError::IllegalTransition(format!(
            "cannot apply {:?} while {:?}",
            cmd, state
        ))),
    }
}

/// Published view of the serving model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub status: ServingStatus,
    pub base_model: String,
    pub current_adapter: Option<AdapterVersion>,
    pub device: String,
}

#[derive(Debug)]
struct ServingInner {
    status: ServingStatus,
    active_adapter: Option<AdapterVersion>,
}

#[derive(Debug)]
pub struct ModelServingState {
    base_model_id: String,
    device: String,
    inner: RwLock<ServingInner>,
}

impl ModelServingState {
    pub fn new(base_model_id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            base_model_id: base_model_id.into(),
            device: device.into(),
            inner: RwLock::new(ServingInner {
                status: ServingStatus::Unloaded,
                active_adapter: None,
            }),
        }
    }

    pub fn base_model_id(&self) -> &str {
        &self.base_model_id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Apply a status-only transition. The mounted adapter is left untouched.
    pub fn apply(&self, transition: ServingTransition) -> Result<ServingStatus, StateError> {
        let mut inner = self.inner.write();
        inner.status = next_status(inner.status, transition)?;
        Ok(inner.status)
    }

    /// Enter `loading` and report the status it was entered from.
    pub fn begin_loading(&self) -> Result<ServingStatus, StateError> {
        let mut inner = self.inner.write();
        let previous = inner.status;
        inner.status = next_status(previous, ServingTransition::BeginLoading)?;
        Ok(previous)
    }

    /// Finish loading while keeping the current adapter.
    pub fn mark_ready(&self) -> Result<(), StateError> {
        self.apply(ServingTransition::Loaded).map(|_| ())
    }

    pub fn mark_unloaded(&self) -> Result<(), StateError> {
        self.apply(ServingTransition::LoadFailed).map(|_| ())
    }

    /// Second phase of the hot-swap: activate `version_id` in the registry
    /// and mount it, in one critical section, leaving the model `ready`.
    ///
    /// Must be called while `loading`. On error nothing observable changes.
    pub fn commit_adapter(
        &self,
        registry: &AdapterRegistry,
        version_id: VersionId,
    ) -> Result<AdapterVersion, SwapError> {
        let mut inner = self.inner.write();
        let next = next_status(inner.status, ServingTransition::Loaded)?;
        let version = registry.activate(version_id)?;

        inner.active_adapter = Some(version.clone());
        inner.status = next;
        Ok(version)
    }

    pub fn status(&self) -> ServingStatus {
        self.inner.read().status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ServingStatus::Ready
    }

    pub fn active_adapter(&self) -> Option<AdapterVersion> {
        self.inner.read().active_adapter.clone()
    }

    pub fn snapshot(&self) -> ModelStatus {
        let inner = self.inner.read();
        ModelStatus {
            status: inner.status,
            base_model: self.base_model_id.clone(),
            current_adapter: inner.active_adapter.clone(),
            device: self.device.clone(),
        }
    }
}
