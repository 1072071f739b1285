//! A model manager that serves canned responses.
//!
//! Responses are keyed by model identifier and loaded from JSON:
//!
//! ```json
//! {
//!   "vehicles/1": { "predictions": [], "image": { "width": 640, "height": 480 } },
//!   "doctr/default": { "result": "ABC 123" }
//! }
//! ```
//!
//! A single-record fixture is repeated for every image of a batched request.
//! An array fixture is returned as-is.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::ModelError;
use crate::manager::ModelManager;
use crate::request::InferenceRequest;
use crate::response::InferenceResponse;

pub struct ReplayModelManager {
  responses: HashMap<String, InferenceResponse>,
  required_api_key: Option<String>,
  loaded: Mutex<HashSet<String>>,
  requests: Mutex<Vec<(String, InferenceRequest)>>,
}

impl ReplayModelManager {
  pub fn new(responses: HashMap<String, InferenceResponse>) -> Self {
    Self {
      responses,
      required_api_key: None,
      loaded: Mutex::new(HashSet::new()),
      requests: Mutex::new(Vec::new()),
    }
  }

  /// Load responses from a JSON file.
  pub async fn from_file(path: &Path) -> Result<Self, ModelError> {
    let content = fs::read_to_string(path).await?;
    let responses: HashMap<String, InferenceResponse> = serde_json::from_str(&content)?;
    Ok(Self::new(responses))
  }

  /// Reject registrations that do not present this key.
  pub fn with_required_api_key(mut self, api_key: impl Into<String>) -> Self {
    self.required_api_key = Some(api_key.into());
    self
  }

  /// Identifiers registered so far.
  pub fn loaded_models(&self) -> HashSet<String> {
    self.loaded.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Requests received so far, in order.
  pub fn requests(&self) -> Vec<(String, InferenceRequest)> {
    self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

#[async_trait]
impl ModelManager for ReplayModelManager {
  async fn add_model(&self, model_id: &str, api_key: Option<&str>) -> Result<(), ModelError> {
    if let Some(required) = &self.required_api_key
      && api_key != Some(required.as_str())
    {
      return Err(ModelError::Unauthorized {
        model_id: model_id.to_string(),
        message: "api key missing or invalid".to_string(),
      });
    }
    if !self.responses.contains_key(model_id) {
      return Err(ModelError::NotFound {
        model_id: model_id.to_string(),
      });
    }

    let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
    loaded.insert(model_id.to_string());
    debug!(model_id = %model_id, "replay model registered");
    Ok(())
  }

  async fn infer(
    &self,
    model_id: &str,
    request: InferenceRequest,
  ) -> Result<InferenceResponse, ModelError> {
    if !self
      .loaded
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .contains(model_id)
    {
      return Err(ModelError::Unavailable {
        model_id: model_id.to_string(),
        message: "model not registered".to_string(),
      });
    }
    let response = self
      .responses
      .get(model_id)
      .ok_or_else(|| ModelError::NotFound {
        model_id: model_id.to_string(),
      })?;

    let batched = request.image().is_array();
    let image_count = request.image_count();
    self
      .requests
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push((model_id.to_string(), request));

    Ok(match response {
      InferenceResponse::Single(record) if batched => {
        InferenceResponse::Many(vec![record.clone(); image_count])
      }
      other => other.clone(),
    })
  }
}
