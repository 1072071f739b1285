use lumen_model::ModelError;
use thiserror::Error;

/// Errors raised by a block while running.
#[derive(Debug, Error)]
pub enum BlockError {
  /// Missing required parameter.
  #[error("missing required parameter: {name}")]
  MissingParameter { name: String },

  /// Parameter present but unusable.
  #[error("invalid parameter '{name}': {message}")]
  InvalidParameter { name: String, message: String },

  /// The model collaborator failed.
  #[error("model invocation failed: {0}")]
  Model(#[from] ModelError),

  #[error("block cancelled")]
  Cancelled,

  #[error("{message}")]
  Failed { message: String },
}

/// Errors that can occur when working with the block registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// No block registered for the step type.
  #[error("unsupported step type: {step_type}")]
  NotFound { step_type: String },

  /// A block for the step type is already registered.
  #[error("step type already registered: {step_type}")]
  AlreadyRegistered { step_type: String },

  /// The block's manifest is inconsistent.
  #[error("invalid manifest for {step_type}: {message}")]
  InvalidManifest { step_type: String, message: String },
}
