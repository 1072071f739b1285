//! Built-in step types.
//!
//! [`register_core_blocks`] installs every built-in block into a
//! [`BlockRegistry`]. Model-backed steps share one implementation that picks
//! a request constructor by step type.

mod condition;
mod crop;
mod model;
mod ocr;

pub use condition::{ConditionBlock, ContinueIfBlock, Operator};
pub use crop::CropBlock;
pub use model::{MODEL_STEP_TYPES, ModelBlock};
pub use ocr::OcrBlock;

use lumen_block::{BlockRegistry, RegistryError};

/// Register all built-in blocks.
pub fn register_core_blocks(registry: &mut BlockRegistry) -> Result<(), RegistryError> {
  for step_type in MODEL_STEP_TYPES {
    registry.register(ModelBlock::new(step_type)?)?;
  }
  registry.register(OcrBlock::new())?;
  registry.register(CropBlock::new())?;
  registry.register(ConditionBlock::new())?;
  registry.register(ContinueIfBlock::new())?;
  Ok(())
}

/// A registry holding every built-in block.
pub fn core_registry() -> Result<BlockRegistry, RegistryError> {
  let mut registry = BlockRegistry::new();
  register_core_blocks(&mut registry)?;
  Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
  use std::collections::HashMap;
  use std::sync::Arc;

  use lumen_block::{BlockContext, ModelServices};
  use lumen_model::{InferenceResponse, ReplayModelManager};
  use tokio_util::sync::CancellationToken;

  /// A context backed by canned model responses.
  pub fn context(responses: serde_json::Value) -> (BlockContext, Arc<ReplayModelManager>) {
    let responses: HashMap<String, InferenceResponse> = serde_json::from_value(responses).unwrap();
    let manager = Arc::new(ReplayModelManager::new(responses));
    let ctx = BlockContext {
      execution_id: "exec".to_string(),
      step_id: "step".to_string(),
      api_key: Some("key".to_string()),
      models: ModelServices::new(manager.clone()),
      cancel: CancellationToken::new(),
    };
    (ctx, manager)
  }
}
