use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use super::{AdaptationOrchestrator, OrchestratorHealth, Shared};
use crate::config::AdaptationConfig;
use crate::feedback::{FeedbackJournal, FeedbackPool, JournalError, JsonlJournal};
use crate::invariants::InvariantEngine;
use crate::log::AdaptationLog;
use crate::policy::AdaptationPolicy;
use crate::registry::{AdapterRegistry, ArtifactStore, LocalArtifactStore, OpaqueArtifactStore};
use crate::runner::TrainingJobRunner;
use crate::serving::{ModelLoader, ModelServingState, NoopModelLoader};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no tokio runtime available; build inside a runtime or pass a handle")]
    NoRuntime,

    #[error("cannot open feedback journal: {0}")]
    Journal(#[from] JournalError),
}

/// Wires the adaptation components together once at process start.
pub struct OrchestratorBuilder {
    config: AdaptationConfig,
    runner: Arc<dyn TrainingJobRunner>,
    loader: Arc<dyn ModelLoader>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    journal: Option<Arc<dyn FeedbackJournal>>,
    invariants: InvariantEngine,
    runtime: Option<Handle>,
}

impl OrchestratorBuilder {
    pub fn new(runner: Arc<dyn TrainingJobRunner>) -> Self {
        Self {
            config: AdaptationConfig::default(),
            runner,
            loader: Arc::new(NoopModelLoader),
            artifacts: None,
            journal: None,
            invariants: InvariantEngine::standard(),
            runtime: None,
        }
    }

    pub fn config(mut self, config: AdaptationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Overrides the store derived from `artifact_root`.
    pub fn artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Overrides the journal derived from `feedback_journal`.
    pub fn journal(mut self, journal: Arc<dyn FeedbackJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn invariants(mut self, invariants: InvariantEngine) -> Self {
        self.invariants = invariants;
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<AdaptationOrchestrator, BuildError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };

        let journal = match (self.journal, &self.config.feedback_journal) {
            (Some(journal), _) => Some(journal),
            (None, Some(path)) => Some(Arc::new(JsonlJournal::open(path)?) as Arc<dyn FeedbackJournal>),
            (None, None) => None,
        };
        let pool = match journal {
            Some(journal) => FeedbackPool::with_journal(journal),
            None => FeedbackPool::new(),
        };

        let artifacts: Arc<dyn ArtifactStore> = match (self.artifacts, &self.config.artifact_root) {
            (Some(artifacts), _) => artifacts,
            (None, Some(root)) => Arc::new(LocalArtifactStore::new(root)),
            (None, None) => Arc::new(OpaqueArtifactStore),
        };

        let shared = Shared {
            pool: Arc::new(pool),
            policy: AdaptationPolicy::new(self.config.policy.clone()),
            registry: Arc::new(AdapterRegistry::new(artifacts)),
            serving: Arc::new(ModelServingState::new(
                self.config.base_model_id.clone(),
                self.config.device.clone(),
            )),
            log: Arc::new(AdaptationLog::new()),
            health: Arc::new(OrchestratorHealth::default()),
            runner: self.runner,
            loader: self.loader,
            invariants: self.invariants,
            job_slot: Arc::new(AsyncMutex::new(())),
            shutdown: CancellationToken::new(),
            training_timeout: self.config.training_timeout(),
            on_failure: self.config.on_failure,
            runtime,
        };

        Ok(AdaptationOrchestrator {
            shared: Arc::new(shared),
        })
    }
}
