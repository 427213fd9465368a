// Model Loader Boundary
//
// Loading weights and mounting adapters happens outside the core.

use async_trait::async_trait;

use crate::registry::AdapterVersion;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("model load failed: {0}")]
pub struct LoadError(pub String);

/// Loads the base model, optionally with an adapter mounted on top.
///
/// Called with the serving state already in `loading`; the caller
/// decides the resulting state from the outcome.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(
        &self,
        base_model_id: &str,
        adapter: Option<&AdapterVersion>,
    ) -> Result<(), LoadError>;
}

/// Loader for deployments where weights are mounted by another process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopModelLoader;

#[async_trait]
impl ModelLoader for NoopModelLoader {
    async fn load(
        &self,
        base_model_id: &str,
        adapter: Option<&AdapterVersion>,
    ) -> Result<(), LoadError> {
        tracing::debug!(
            base_model = base_model_id,
            adapter = ?adapter.map(|a| a.version_id),
            "noop model load"
        );
        Ok(())
    }
}
