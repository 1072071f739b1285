use async_trait::async_trait;

use crate::error::ModelError;
use crate::request::InferenceRequest;
use crate::response::InferenceResponse;

/// Registry and invoker for models.
///
/// Implementations own weights and remote clients. `add_model` must behave as
/// an upsert: registering an identifier that is already present is not an error.
#[async_trait]
pub trait ModelManager: Send + Sync {
  /// Make the model available for inference.
  async fn add_model(&self, model_id: &str, api_key: Option<&str>) -> Result<(), ModelError>;

  /// Run inference for a typed request.
  async fn infer(
    &self,
    model_id: &str,
    request: InferenceRequest,
  ) -> Result<InferenceResponse, ModelError>;
}
