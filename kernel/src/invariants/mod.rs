// Invariant Framework
//
// Invariants are pure rules over the registry and serving state,
// checked at the end of every retraining cycle. A violation means
// the adapter being served is undefined, so the orchestrator stops
// accepting cycles until an operator intervenes.

use crate::registry::{AdapterRegistry, VersionId};
use crate::serving::{ModelServingState, ModelStatus, ServingStatus};

/// Point-in-time view checked by invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitView {
    pub registered: Vec<VersionId>,
    pub active_version: Option<VersionId>,
    pub model: ModelStatus,
}

impl CommitView {
    pub fn capture(registry: &AdapterRegistry, serving: &ModelServingState) -> Self {
        Self {
            registered: registry.versions().iter().map(|v| v.version_id).collect(),
            active_version: registry.active_version_id(),
            model: serving.snapshot(),
        }
    }
}

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Invariants must be pure and side-effect free.
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, view: &CommitView) -> InvariantResult;
}

/// The active pointer names a registered version.
pub struct ActiveVersionRegistered;

impl Invariant for ActiveVersionRegistered {
    fn name(&self) -> &'static str {
        "active-version-registered"
    }

    fn validate(&self, view: &CommitView) -> InvariantResult {
        match view.active_version {
            Some(id) if !view.registered.contains(&id) => {
                InvariantResult::Fail(format!("active version {id} is not in the registry"))
            }
            _ => InvariantResult::Pass,
        }
    }
}

/// A ready model serves exactly the adapter the registry marks active.
pub struct ServingMatchesRegistry;

impl Invariant for ServingMatchesRegistry {
    fn name(&self) -> &'static str {
        "serving-matches-registry"
    }

    fn validate(&self, view: &CommitView) -> InvariantResult {
        if view.model.status != ServingStatus::Ready {
            return InvariantResult::Pass;
        }

        let mounted = view.model.current_adapter.as_ref().map(|a| a.version_id);
        if mounted == view.active_version {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!(
                "serving adapter {mounted:?} but registry active is {:?}",
                view.active_version
            ))
        }
    }
}

#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Engine with the registry/serving consistency rules registered.
    pub fn standard() -> Self {
        let mut engine = Self::new();
        engine.register(ActiveVersionRegistered);
        engine.register(ServingMatchesRegistry);
        engine
    }

    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Stops at the first failure.
    pub fn evaluate(&self, view: &CommitView) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            if let InvariantResult::Fail(reason) = invariant.validate(view) {
                return Err(InvariantViolation {
                    invariant: invariant.name(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for InvariantEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.invariants.iter().map(|i| i.name()).collect();
        f.debug_struct("InvariantEngine")
            .field("invariants", &names)
            .finish()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AdapterVersion, StorageRef};
    use chrono::Utc;

    fn adapter(version_id: VersionId) -> AdapterVersion {
        AdapterVersion {
            version_id,
            created_at: Utc::now(),
            source_feedback_count: 1,
            storage_reference: StorageRef::new(format!("adapters/adapter_{version_id}")),
        }
    }

    fn view(status: ServingStatus, mounted: Option<VersionId>, active: Option<VersionId>) -> CommitView {
        CommitView {
            registered: vec![1, 2],
            active_version: active,
            model: ModelStatus {
                status,
                base_model: "base".into(),
                current_adapter: mounted.map(adapter),
                device: "cpu".into(),
            },
        }
    }

    #[test]
    fn consistent_views_pass() {
        let engine = InvariantEngine::standard();
        engine.evaluate(&view(ServingStatus::Ready, Some(2), Some(2))).unwrap();
        engine.evaluate(&view(ServingStatus::Ready, None, None)).unwrap();
        engine.evaluate(&view(ServingStatus::Loading, Some(1), Some(2))).unwrap();
    }

    #[test]
    fn unregistered_active_version_fails() {
        let engine = InvariantEngine::standard();

        let err = engine
            .evaluate(&view(ServingStatus::Loading, None, Some(9)))
            .unwrap_err();

        assert!(err.to_string().contains("active-version-registered"));
    }

    #[test]
    fn ready_with_mismatched_adapter_fails() {
        let engine = InvariantEngine::standard();

        let err = engine
            .evaluate(&view(ServingStatus::Ready, Some(1), Some(2)))
            .unwrap_err();

        assert_eq!(err.invariant, "serving-matches-registry");
    }
}
