// Adaptation Orchestrator
//
// Turns accumulated feedback into a new serving adapter:
// policy → job slot → drain → train → register → mount → activate → log.
//
// At most one cycle runs at a time. Taking the job slot never blocks
// the submitter; training runs on its own task.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::feedback::{FeedbackId, FeedbackItem, FeedbackPool, SubmitFeedbackError};
use crate::invariants::{CommitView, InvariantEngine, InvariantViolation};
use crate::log::{AdaptationEvent, AdaptationLog};
use crate::policy::{AdaptationPolicy, FailedBatchPolicy};
use crate::registry::{AdapterRegistry, AdapterVersion, NewAdapterVersion, NotFoundError, StorageError};
use crate::runner::{TrainedArtifact, TrainingFailure, TrainingJob, TrainingJobRunner};
use crate::serving::{LoadError, ModelLoader, ModelServingState, ServingStatus, StateError, SwapError};
use crate::status::StatusAggregator;

mod builder;
mod health;

pub use builder::{BuildError, OrchestratorBuilder};
pub use health::{HealthSnapshot, OrchestratorHealth};

use health::InFlight;

/// Why a retraining cycle did not produce a serving adapter.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Training(#[from] TrainingFailure),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("adaptation halted: {0}")]
    Halted(String),
}

impl From<SwapError> for CycleError {
    fn from(err: SwapError) -> Self {
        match err {
            SwapError::State(err) => CycleError::State(err),
            SwapError::NotFound(err) => CycleError::NotFound(err),
        }
    }
}

impl CycleError {
    /// Fatal errors mean the served adapter can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CycleError::State(_) | CycleError::NotFound(_) | CycleError::Invariant(_)
        )
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(AdapterVersion),
    Failed(CycleError),
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub feedback_count: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn adapter(&self) -> Option<&AdapterVersion> {
        match &self.outcome {
            CycleOutcome::Completed(version) => Some(version),
            CycleOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CycleError> {
        match &self.outcome {
            CycleOutcome::Completed(_) => None,
            CycleOutcome::Failed(err) => Some(err),
        }
    }
}

/// A cycle that has drained the pool and is training in the background.
#[derive(Debug)]
pub struct CycleHandle {
    pub cycle_id: Uuid,
    pub feedback_count: usize,
    task: JoinHandle<CycleReport>,
}

impl CycleHandle {
    pub async fn wait(self) -> Result<CycleReport, JoinError> {
        self.task.await
    }
}

/// Result of evaluating the policy after a submission.
#[derive(Debug)]
pub enum TriggerOutcome {
    BelowThreshold { pool_size: usize, threshold: usize },
    AlreadyRunning,
    Halted { reason: String },
    ShuttingDown,
    Started(CycleHandle),
}

impl TriggerOutcome {
    pub fn started(self) -> Option<CycleHandle> {
        match self {
            TriggerOutcome::Started(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, TriggerOutcome::Started(_))
    }
}

#[derive(Debug)]
pub struct SubmitReceipt {
    pub item_id: FeedbackId,
    pub pool_size: usize,
    pub feedback_threshold: usize,
    pub outcome: TriggerOutcome,
}

impl SubmitReceipt {
    pub fn message(&self) -> String {
        match &self.outcome {
            TriggerOutcome::Started(_) => "Feedback received. Adaptation triggered.".to_string(),
            TriggerOutcome::Halted { reason } => {
                format!("Feedback received. Adaptation halted: {reason}")
            }
            TriggerOutcome::ShuttingDown => {
                "Feedback received. Adaptation stopped for shutdown.".to_string()
            }
            _ => format!(
                "Feedback received. {}/{} to next adaptation.",
                self.pool_size, self.feedback_threshold
            ),
        }
    }
}

struct Shared {
    pool: Arc<FeedbackPool>,
    policy: AdaptationPolicy,
    registry: Arc<AdapterRegistry>,
    serving: Arc<ModelServingState>,
    log: Arc<AdaptationLog>,
    health: Arc<OrchestratorHealth>,
    runner: Arc<dyn TrainingJobRunner>,
    loader: Arc<dyn ModelLoader>,
    invariants: InvariantEngine,
    job_slot: Arc<AsyncMutex<()>>,
    shutdown: CancellationToken,
    training_timeout: Option<Duration>,
    on_failure: FailedBatchPolicy,
    runtime: Handle,
}

/// Owns every adaptation component. Clones share the same state.
#[derive(Clone)]
pub struct AdaptationOrchestrator {
    shared: Arc<Shared>,
}

impl AdaptationOrchestrator {
    pub fn builder(runner: Arc<dyn TrainingJobRunner>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(runner)
    }

    /// Feedback ingestion surface: validate, pool, then evaluate the policy.
    pub fn submit_feedback(
        &self,
        prompt: impl Into<String>,
        original_completion: impl Into<String>,
        corrected_completion: impl Into<String>,
    ) -> Result<SubmitReceipt, SubmitFeedbackError> {
        self.submit(FeedbackItem::new(
            prompt,
            original_completion,
            corrected_completion,
        ))
    }

    pub fn submit(&self, item: FeedbackItem) -> Result<SubmitReceipt, SubmitFeedbackError> {
        let item_id = item.id;
        let pool_size = self.shared.pool.submit(item)?;
        debug!(item = %item_id.0, pool_size, "feedback accepted");

        let outcome = self.on_feedback_submitted();
        Ok(SubmitReceipt {
            item_id,
            pool_size: self.shared.pool.size(),
            feedback_threshold: self.shared.policy.threshold(),
            outcome,
        })
    }

    /// Evaluate the policy and start a cycle if it fires and the slot is free.
    ///
    /// Never waits on a running cycle. Callable from any thread; the cycle
    /// is spawned on the runtime captured at build time.
    pub fn on_feedback_submitted(&self) -> TriggerOutcome {
        let shared = &self.shared;

        let pool_size = shared.pool.size();
        let threshold = shared.policy.threshold();
        if !shared.policy.should_trigger(pool_size) {
            debug!(pool_size, threshold, "below adaptation threshold");
            return TriggerOutcome::BelowThreshold {
                pool_size,
                threshold,
            };
        }

        if let Some(reason) = shared.health.halted_reason() {
            warn!(pool_size, %reason, "adaptation halted, not starting a cycle");
            return TriggerOutcome::Halted { reason };
        }

        if shared.shutdown.is_cancelled() {
            debug!(pool_size, "shutting down, not starting a cycle");
            return TriggerOutcome::ShuttingDown;
        }

        let slot = match Arc::clone(&shared.job_slot).try_lock_owned() {
            Ok(slot) => slot,
            Err(_) => {
                debug!(pool_size, "cycle already in flight, deferring to next evaluation");
                return TriggerOutcome::AlreadyRunning;
            }
        };

        // Halts are only raised by slot holders; re-check now that we are one.
        if let Some(reason) = shared.health.halted_reason() {
            return TriggerOutcome::Halted { reason };
        }
        if shared.shutdown.is_cancelled() {
            return TriggerOutcome::ShuttingDown;
        }

        let in_flight = InFlight::enter(slot, Arc::clone(&shared.health));
        let cycle_id = Uuid::new_v4();

        // Drain before logging `triggered` so its count is the batch size,
        // even if a submission landed after the size read above.
        let batch = shared.pool.drain();
        let feedback_count = batch.len();
        shared
            .log
            .append(AdaptationEvent::Triggered { feedback_count });
        info!(%cycle_id, feedback_count, threshold, "adaptation triggered");

        let prior = shared.serving.begin_loading();

        let task = shared.runtime.spawn(Arc::clone(shared).run_cycle(
            cycle_id,
            batch,
            prior,
            in_flight,
        ));

        TriggerOutcome::Started(CycleHandle {
            cycle_id,
            feedback_count,
            task,
        })
    }

    /// Process start: `unloaded → loading → ready`, or back to `unloaded` on failure.
    ///
    /// Holds the job slot for the whole load, so health reports a cycle in
    /// flight and no retraining cycle can start meanwhile.
    pub async fn load_base_model(&self) -> Result<(), CycleError> {
        let shared = &self.shared;
        let slot = Arc::clone(&shared.job_slot).lock_owned().await;
        if let Some(reason) = shared.health.halted_reason() {
            warn!(%reason, "adaptation halted, not loading base model");
            return Err(CycleError::Halted(reason));
        }
        let _in_flight = InFlight::enter(slot, Arc::clone(&shared.health));

        shared.serving.begin_loading()?;
        let adapter = shared.serving.active_adapter();
        info!(
            base_model = shared.serving.base_model_id(),
            device = shared.serving.device(),
            "loading base model"
        );

        match shared.mount(adapter).await {
            Ok(()) => {
                shared.serving.mark_ready()?;
                info!("base model ready");
                Ok(())
            }
            Err(err) => {
                shared.serving.mark_unloaded()?;
                warn!(error = %err, "base model failed to load");
                Err(err.into())
            }
        }
    }

    /// Wait until no cycle holds the job slot.
    pub async fn wait_idle(&self) {
        let _slot = self.shared.job_slot.lock().await;
    }

    /// Operator action after a halt has been investigated.
    pub fn resume(&self) -> Option<String> {
        let cleared = self.shared.health.clear_halt();
        if let Some(reason) = &cleared {
            info!(%reason, "adaptation resumed");
        }
        cleared
    }

    /// Cancel any in-flight training. Later evaluations leave the pool untouched.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn status(&self) -> StatusAggregator {
        let shared = &self.shared;
        StatusAggregator::new(
            Arc::clone(&shared.pool),
            shared.policy.clone(),
            Arc::clone(&shared.registry),
            Arc::clone(&shared.serving),
            Arc::clone(&shared.log),
            Arc::clone(&shared.health),
        )
    }

    pub fn pool(&self) -> &FeedbackPool {
        &self.shared.pool
    }

    pub fn policy(&self) -> &AdaptationPolicy {
        &self.shared.policy
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.shared.registry
    }

    pub fn serving(&self) -> &ModelServingState {
        &self.shared.serving
    }

    pub fn log(&self) -> &AdaptationLog {
        &self.shared.log
    }

    pub fn health(&self) -> &OrchestratorHealth {
        &self.shared.health
    }
}

impl Shared {
    #[tracing::instrument(name = "adaptation_cycle", skip_all, fields(cycle_id = %cycle_id, batch = batch.len()))]
    async fn run_cycle(
        self: Arc<Self>,
        cycle_id: Uuid,
        batch: Vec<FeedbackItem>,
        prior: Result<ServingStatus, StateError>,
        in_flight: InFlight,
    ) -> CycleReport {
        let feedback_count = batch.len();
        let retained = match self.on_failure {
            FailedBatchPolicy::Requeue => Some(batch.clone()),
            FailedBatchPolicy::Discard => None,
        };

        let outcome = match self.execute(batch, prior).await {
            Ok(version) => {
                self.log.append(AdaptationEvent::Completed {
                    feedback_count,
                    adapter_version: version.version_id,
                });
                info!(
                    version = version.version_id,
                    reference = %version.storage_reference,
                    "adapter activated"
                );
                CycleOutcome::Completed(version)
            }
            Err(err) => {
                if let Some(batch) = retained {
                    self.pool.requeue(batch);
                }
                self.log.append(AdaptationEvent::Failed {
                    reason: err.to_string(),
                });

                if err.is_fatal() {
                    error!(error = %err, "adaptation halted by internal error");
                    self.health.halt(err.to_string());
                } else {
                    warn!(error = %err, "adaptation cycle failed, previous adapter kept");
                }
                CycleOutcome::Failed(err)
            }
        };

        drop(in_flight);
        CycleReport {
            cycle_id,
            feedback_count,
            outcome,
        }
    }

    async fn execute(
        &self,
        batch: Vec<FeedbackItem>,
        prior: Result<ServingStatus, StateError>,
    ) -> Result<AdapterVersion, CycleError> {
        let prior = prior?;

        let committed = self.train_and_commit(batch).await;
        if let Err(err) = &committed {
            debug!(error = %err, ?prior, "restoring serving state");
            self.restore_serving(prior)?;
        }

        self.invariants
            .evaluate(&CommitView::capture(&self.registry, &self.serving))?;
        committed
    }

    async fn train_and_commit(&self, batch: Vec<FeedbackItem>) -> Result<AdapterVersion, CycleError> {
        let source_feedback_count = batch.len();
        let job = TrainingJob {
            batch,
            base_adapter: self.registry.active(),
            cancel: self.shutdown.child_token(),
        };

        let artifact = self.train(job).await?;
        let version = self.registry.register(NewAdapterVersion {
            storage_reference: artifact.storage_reference,
            source_feedback_count,
        })?;
        debug!(version = version.version_id, "adapter registered");

        self.mount(Some(version.clone())).await?;

        Ok(self.serving.commit_adapter(&self.registry, version.version_id)?)
    }

    /// Run the loader on its own task so a panicking loader surfaces as a
    /// load failure instead of unwinding the caller.
    async fn mount(&self, adapter: Option<AdapterVersion>) -> Result<(), LoadError> {
        let loader = Arc::clone(&self.loader);
        let base_model_id = self.serving.base_model_id().to_string();
        let task = self
            .runtime
            .spawn(async move { loader.load(&base_model_id, adapter.as_ref()).await });

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(LoadError("model loader panicked".to_string())),
            Err(_) => Err(LoadError("model loader task was cancelled".to_string())),
        }
    }

    async fn train(&self, job: TrainingJob) -> Result<TrainedArtifact, TrainingFailure> {
        let cancel = job.cancel.clone();
        let runner = Arc::clone(&self.runner);
        let mut task = self.runtime.spawn(async move { runner.run(job).await });

        let limit = self.training_timeout;
        let deadline = async move {
            match limit {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => Err(TrainingFailure::Panicked),
                Err(_) => Err(TrainingFailure::Cancelled),
            },
            limit = deadline => {
                cancel.cancel();
                task.abort();
                Err(TrainingFailure::DeadlineExceeded(limit))
            }
            _ = cancel.cancelled() => {
                task.abort();
                Err(TrainingFailure::Cancelled)
            }
        }
    }

    fn restore_serving(&self, prior: ServingStatus) -> Result<(), StateError> {
        if self.serving.status() != ServingStatus::Loading {
            return Ok(());
        }
        match prior {
            ServingStatus::Ready => self.serving.mark_ready(),
            ServingStatus::Unloaded | ServingStatus::Loading => self.serving.mark_unloaded(),
        }
    }
}
