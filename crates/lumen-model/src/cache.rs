//! Process-wide model registration.
//!
//! Models are registered with the [`ModelManager`] once per identifier. Later
//! registrations of the same identifier are no-ops, including concurrent ones.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::ModelError;
use crate::manager::ModelManager;

/// Tracks which models have been registered with a manager.
pub struct LoadedModels {
  loaded: RwLock<HashMap<String, Arc<OnceCell<()>>>>,
}

impl LoadedModels {
  pub fn new() -> Self {
    Self {
      loaded: RwLock::new(HashMap::new()),
    }
  }

  /// Register the model with the manager unless it is already registered.
  ///
  /// Concurrent callers for the same identifier wait on a single registration.
  /// A failed registration is not remembered, so a later call retries it.
  pub async fn ensure_loaded(
    &self,
    manager: &dyn ModelManager,
    model_id: &str,
    api_key: Option<&str>,
  ) -> Result<(), ModelError> {
    let cell = self.cell(model_id);
    cell
      .get_or_try_init(|| async {
        debug!(model_id = %model_id, "registering model");
        manager.add_model(model_id, api_key).await
      })
      .await?;
    Ok(())
  }

  /// Whether the model has been registered successfully.
  pub fn is_loaded(&self, model_id: &str) -> bool {
    let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner());
    loaded
      .get(model_id)
      .is_some_and(|cell| cell.initialized())
  }

  fn cell(&self, model_id: &str) -> Arc<OnceCell<()>> {
    // Try read lock first
    {
      let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner());
      if let Some(cell) = loaded.get(model_id) {
        return cell.clone();
      }
    }

    let mut loaded = self.loaded.write().unwrap_or_else(|e| e.into_inner());
    loaded
      .entry(model_id.to_string())
      .or_insert_with(|| Arc::new(OnceCell::new()))
      .clone()
  }
}

impl Default for LoadedModels {
  fn default() -> Self {
    Self::new()
  }
}
