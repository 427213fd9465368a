// Adaptation Policy
//
// Decides when accumulated feedback is enough to retrain.
// Evaluated on every accepted submission, never on a timer.

use serde::{Deserialize, Serialize};

/// Policy configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Pool size at which a retraining cycle starts. Zero disables adaptation.
    pub feedback_threshold: usize,
}

impl PolicyConfig {
    /// Built-in policy used when no config is provided.
    pub fn default_policy() -> Self {
        Self {
            feedback_threshold: 3,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// What happens to a batch whose retraining cycle failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedBatchPolicy {
    /// The batch is considered consumed; operators resubmit if they want a retry.
    #[default]
    Discard,

    /// The batch goes back to the front of the pool for the next cycle.
    Requeue,
}

/// Trigger decision: `pool_size >= threshold` with a non-zero threshold.
pub fn should_trigger(pool_size: usize, threshold: usize) -> bool {
    threshold > 0 && pool_size >= threshold
}

/// Counts reported on the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatus {
    pub feedback_count: usize,
    pub feedback_threshold: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AdaptationPolicy {
    config: PolicyConfig,
}

impl AdaptationPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> usize {
        self.config.feedback_threshold
    }

    pub fn should_trigger(&self, pool_size: usize) -> bool {
        should_trigger(pool_size, self.config.feedback_threshold)
    }

    pub fn status(&self, pool_size: usize) -> PolicyStatus {
        PolicyStatus {
            feedback_count: pool_size,
            feedback_threshold: self.config.feedback_threshold,
        }
    }
}
