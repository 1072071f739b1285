//! Model invocation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
  /// Credentials were missing or rejected.
  #[error("unauthorized access to model '{model_id}': {message}")]
  Unauthorized { model_id: String, message: String },

  #[error("model not found: {model_id}")]
  NotFound { model_id: String },

  /// The model exists but could not serve the request.
  #[error("model '{model_id}' unavailable: {message}")]
  Unavailable { model_id: String, message: String },

  #[error("invalid inference request: {message}")]
  InvalidRequest { message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl ModelError {
  /// Whether the failure was caused by the caller (bad credentials, unknown
  /// model, malformed request) rather than by infrastructure.
  pub fn is_user_error(&self) -> bool {
    matches!(
      self,
      ModelError::Unauthorized { .. } | ModelError::NotFound { .. } | ModelError::InvalidRequest { .. }
    )
  }
}
