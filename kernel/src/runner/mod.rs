// Training Job Runner Boundary
//
// The fine-tune itself is external. The orchestrator hands over a
// drained batch and the adapter to start from, and gets back a
// reference to the trained artifact or a failure.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::feedback::FeedbackItem;
use crate::registry::{AdapterVersion, StorageRef};

pub mod simulated;

pub use simulated::SimulatedRunner;

/// Everything a runner needs for one retraining pass.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub batch: Vec<FeedbackItem>,
    pub base_adapter: Option<AdapterVersion>,

    /// Cancelled on shutdown or when the training deadline passes.
    /// Runners should stop promptly once it fires.
    pub cancel: CancellationToken,
}

/// Output of a successful run. The registry assigns version metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainedArtifact {
    pub storage_reference: StorageRef,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TrainingFailure {
    #[error("training failed: {0}")]
    Runner(String),

    #[error("training cancelled")]
    Cancelled,

    #[error("training exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("training task panicked")]
    Panicked,
}

#[async_trait]
pub trait TrainingJobRunner: Send + Sync {
    /// May run for minutes. Always invoked off the submission path.
    async fn run(&self, job: TrainingJob) -> Result<TrainedArtifact, TrainingFailure>;
}
