use std::sync::Arc;

use async_trait::async_trait;
use lumen_model::{InferenceRequest, InferenceResponse, LoadedModels, ModelManager};
use tokio_util::sync::CancellationToken;

use crate::error::BlockError;
use crate::manifest::StepManifest;
use crate::result::StepResult;
use crate::value::StepParams;

/// A step type.
///
/// `run` receives parameters already resolved against workflow inputs and
/// prior step outputs. Blocks that do not accept batch input are called once
/// per batch element by the dispatcher.
#[async_trait]
pub trait Block: Send + Sync {
  fn manifest(&self) -> &StepManifest;

  async fn run(&self, params: StepParams, ctx: &BlockContext) -> Result<StepResult, BlockError>;
}

/// The model collaborator shared by every run of a runtime.
#[derive(Clone)]
pub struct ModelServices {
  manager: Arc<dyn ModelManager>,
  loaded: Arc<LoadedModels>,
}

impl ModelServices {
  pub fn new(manager: Arc<dyn ModelManager>) -> Self {
    Self {
      manager,
      loaded: Arc::new(LoadedModels::new()),
    }
  }

  pub fn manager(&self) -> &Arc<dyn ModelManager> {
    &self.manager
  }

  pub fn loaded(&self) -> &LoadedModels {
    &self.loaded
  }
}

/// Per-step context handed to [`Block::run`].
#[derive(Clone)]
pub struct BlockContext {
  pub execution_id: String,
  pub step_id: String,
  pub api_key: Option<String>,
  pub models: ModelServices,
  pub cancel: CancellationToken,
}

impl BlockContext {
  /// Register the model unless already registered. Idempotent.
  pub async fn ensure_model_loaded(&self, model_id: &str) -> Result<(), BlockError> {
    self
      .models
      .loaded
      .ensure_loaded(self.models.manager.as_ref(), model_id, self.api_key.as_deref())
      .await?;
    Ok(())
  }

  /// Invoke the model, giving up early if the run is cancelled.
  pub async fn infer(
    &self,
    model_id: &str,
    request: InferenceRequest,
  ) -> Result<InferenceResponse, BlockError> {
    tokio::select! {
      result = self.models.manager.infer(model_id, request) => result.map_err(BlockError::from),
      _ = self.cancel.cancelled() => Err(BlockError::Cancelled),
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }
}
