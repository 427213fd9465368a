// Status Aggregation
//
// Read-only composition of every component's published state.
// Fields are read one component at a time; the snapshot is not
// atomic across components.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackPool;
use crate::log::{AdaptationLog, AdaptationLogEntry};
use crate::orchestrator::{HealthSnapshot, OrchestratorHealth};
use crate::policy::{AdaptationPolicy, PolicyStatus};
use crate::registry::{AdapterRegistry, AdapterVersion};
use crate::serving::{ModelServingState, ModelStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub model_status: ModelStatus,
    pub policy: PolicyStatus,
    /// Oldest first.
    pub adaptation_log: Vec<AdaptationLogEntry>,
    pub feedback_pool_size: usize,
    pub adapters: Vec<AdapterVersion>,
    pub orchestrator: HealthSnapshot,
}

impl StatusSnapshot {
    /// Log in presentation order.
    pub fn log_newest_first(&self) -> impl Iterator<Item = &AdaptationLogEntry> {
        self.adaptation_log.iter().rev()
    }
}

#[derive(Debug, Clone)]
pub struct StatusAggregator {
    pool: Arc<FeedbackPool>,
    policy: AdaptationPolicy,
    registry: Arc<AdapterRegistry>,
    serving: Arc<ModelServingState>,
    log: Arc<AdaptationLog>,
    health: Arc<OrchestratorHealth>,
}

impl StatusAggregator {
    pub fn new(
        pool: Arc<FeedbackPool>,
        policy: AdaptationPolicy,
        registry: Arc<AdapterRegistry>,
        serving: Arc<ModelServingState>,
        log: Arc<AdaptationLog>,
        health: Arc<OrchestratorHealth>,
    ) -> Self {
        Self {
            pool,
            policy,
            registry,
            serving,
            log,
            health,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let feedback_pool_size = self.pool.size();
        StatusSnapshot {
            model_status: self.serving.snapshot(),
            policy: self.policy.status(feedback_pool_size),
            adaptation_log: self.log.entries(),
            feedback_pool_size,
            adapters: self.registry.versions(),
            orchestrator: self.health.snapshot(),
        }
    }
}
