use std::collections::HashMap;
use std::sync::Arc;

use crate::block::Block;
use crate::error::RegistryError;
use crate::manifest::StepManifest;

/// Maps step type tags to block implementations.
///
/// Manifests are validated on registration, so every registered block is
/// known to be well-formed before a workflow runs.
#[derive(Default, Clone)]
pub struct BlockRegistry {
  blocks: HashMap<String, Arc<dyn Block>>,
}

impl BlockRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a block under its manifest's step type.
  pub fn register<B: Block + 'static>(&mut self, block: B) -> Result<(), RegistryError> {
    self.register_arc(Arc::new(block))
  }

  pub fn register_arc(&mut self, block: Arc<dyn Block>) -> Result<(), RegistryError> {
    let manifest = block.manifest();
    manifest.validate()?;

    if self.blocks.contains_key(&manifest.step_type) {
      return Err(RegistryError::AlreadyRegistered {
        step_type: manifest.step_type.clone(),
      });
    }

    self.blocks.insert(manifest.step_type.clone(), block);
    Ok(())
  }

  pub fn get(&self, step_type: &str) -> Option<Arc<dyn Block>> {
    self.blocks.get(step_type).cloned()
  }

  pub fn contains(&self, step_type: &str) -> bool {
    self.blocks.contains_key(step_type)
  }

  /// All manifests, sorted by step type.
  pub fn manifests(&self) -> Vec<&StepManifest> {
    let mut manifests: Vec<&StepManifest> = self.blocks.values().map(|b| b.manifest()).collect();
    manifests.sort_by(|a, b| a.step_type.cmp(&b.step_type));
    manifests
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use serde_json::json;

  use super::*;
  use crate::block::BlockContext;
  use crate::error::BlockError;
  use crate::result::StepResult;
  use crate::value::StepParams;

  struct Echo {
    manifest: StepManifest,
  }

  impl Echo {
    fn new(step_type: &str) -> Self {
      Self {
        manifest: StepManifest::new(step_type)
          .parameters(&["value"])
          .outputs(&["value"]),
      }
    }
  }

  #[async_trait]
  impl Block for Echo {
    fn manifest(&self) -> &StepManifest {
      &self.manifest
    }

    async fn run(&self, params: StepParams, _ctx: &BlockContext) -> Result<StepResult, BlockError> {
      let value = params.value("value")?.cloned().unwrap_or(json!(null));
      Ok(StepResult::from_json(json!({ "value": value })))
    }
  }

  #[test]
  fn test_register_and_get() {
    let mut registry = BlockRegistry::new();
    registry.register(Echo::new("Echo")).unwrap();
    registry.register(Echo::new("Another")).unwrap();

    assert!(registry.contains("Echo"));
    assert!(registry.get("Missing").is_none());
    assert_eq!(registry.len(), 2);

    let types: Vec<_> = registry
      .manifests()
      .into_iter()
      .map(|m| m.step_type.as_str())
      .collect();
    assert_eq!(types, vec!["Another", "Echo"]);
  }

  #[test]
  fn test_duplicate_registration() {
    let mut registry = BlockRegistry::new();
    registry.register(Echo::new("Echo")).unwrap();
    let err = registry.register(Echo::new("Echo")).unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
  }

  #[test]
  fn test_unknown_step_type() {
    let registry = BlockRegistry::new();
    assert!(registry.get("Nope").is_none());
    assert!(!registry.contains("Nope"));
  }

  #[test]
  fn test_invalid_manifest_rejected() {
    let mut registry = BlockRegistry::new();
    let mut block = Echo::new("Bad");
    block.manifest = block.manifest.reference("missing");
    assert!(matches!(
      registry.register(block),
      Err(RegistryError::InvalidManifest { .. })
    ));
    assert!(registry.is_empty());
  }
}
