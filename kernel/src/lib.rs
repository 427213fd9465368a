// Adapt Kernel
//
// Feedback-driven adaptation core: collects corrections, decides when
// to retrain, runs one retraining cycle at a time and hot-swaps the
// resulting adapter into the serving path.

pub mod config;
pub mod feedback;
pub mod invariants;
pub mod log;
pub mod orchestrator;
pub mod policy;
pub mod registry;
pub mod runner;
pub mod serving;
pub mod status;

pub use config::AdaptationConfig;
pub use orchestrator::{AdaptationOrchestrator, CycleError, CycleOutcome, TriggerOutcome};
pub use status::{StatusAggregator, StatusSnapshot};
