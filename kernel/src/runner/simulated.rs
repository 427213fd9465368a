// Simulated Runner
//
// Stands in for a real fine-tune: waits, then names a fresh artifact
// using the `adapters/adapter_<n>/final` layout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{TrainedArtifact, TrainingFailure, TrainingJob, TrainingJobRunner};
use crate::registry::StorageRef;

#[derive(Debug)]
pub struct SimulatedRunner {
    delay: Duration,
    fail: bool,
    runs: AtomicU64,
}

impl SimulatedRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            runs: AtomicU64::new(0),
        }
    }

    /// Every run fails after the delay.
    pub fn failing(delay: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(delay)
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrainingJobRunner for SimulatedRunner {
    async fn run(&self, job: TrainingJob) -> Result<TrainedArtifact, TrainingFailure> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            run,
            batch = job.batch.len(),
            base_adapter = ?job.base_adapter.as_ref().map(|a| a.version_id),
            "simulated training started"
        );

        tokio::select! {
            _ = job.cancel.cancelled() => return Err(TrainingFailure::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        if self.fail || job.batch.is_empty() {
            return Err(TrainingFailure::Runner(format!(
                "simulated run {run} produced no adapter"
            )));
        }

        Ok(TrainedArtifact {
            storage_reference: StorageRef::new(format!("adapters/adapter_{run}/final")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackItem;
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    fn job(items: usize) -> TrainingJob {
        TrainingJob {
            batch: (0..items)
                .map(|n| FeedbackItem::new(format!("p{n}"), "a", "b"))
                .collect(),
            base_adapter: None,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn names_a_new_artifact_per_run() {
        let runner = SimulatedRunner::new(Duration::from_millis(1));

        let first = runner.run(job(2)).await.unwrap();
        let second = runner.run(job(2)).await.unwrap();

        assert_eq!(first.storage_reference.as_str(), "adapters/adapter_1/final");
        assert_eq!(second.storage_reference.as_str(), "adapters/adapter_2/final");
        assert_eq!(runner.runs(), 2);
    }

    #[tokio::test]
    async fn empty_batch_fails() {
        let runner = SimulatedRunner::new(Duration::ZERO);
        assert!(matches!(
            runner.run(job(0)).await,
            Err(TrainingFailure::Runner(_))
        ));
    }

    #[tokio::test]
    async fn honors_cancellation() {
        let runner = SimulatedRunner::new(Duration::from_secs(600));
        let job = job(1);
        job.cancel.cancel();

        assert_eq!(runner.run(job).await, Err(TrainingFailure::Cancelled));
    }
}
