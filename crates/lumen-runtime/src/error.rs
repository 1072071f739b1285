//! Runtime error types.

use std::collections::HashMap;

use lumen_block::BlockError;
use lumen_model::ModelError;

use crate::lookup::OutputsLookup;
use crate::result::StepStatus;

/// Errors raised by the outputs lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
  #[error("step '{step_id}' already has an entry")]
  DuplicateKey { step_id: String },

  /// No entry for the step; it has not produced data in this run.
  #[error("no output recorded for step '{step_id}'")]
  MissingKey { step_id: String },
}

/// Errors raised while resolving a single parameter.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  #[error("input '{name}' is not bound")]
  UnboundInput { name: String },

  #[error(transparent)]
  Lookup(#[from] LookupError),
}

/// Errors that can occur during workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// A selector names an unbound input, a step without output, or an
  /// undeclared output field.
  #[error("addressing error in step '{step_id}': {message}")]
  Addressing { step_id: String, message: String },

  /// A step wrote its output twice.
  #[error("step '{step_id}' produced output twice")]
  DuplicateKey { step_id: String },

  #[error("dimensionality mismatch in step '{step_id}': {message}")]
  DimensionalityMismatch { step_id: String, message: String },

  /// The model collaborator failed.
  #[error("model invocation failed in step '{step_id}': {source}")]
  ModelInvocation {
    step_id: String,
    #[source]
    source: ModelError,
  },

  /// No block registered for a step's type.
  #[error("step '{step_id}' has unsupported type '{step_type}'")]
  UnsupportedStepType { step_id: String, step_type: String },

  /// A declared workflow input was not supplied and has no default.
  #[error("missing workflow input '{name}'")]
  MissingInput { name: String },

  #[error("step '{step_id}' failed: {source}")]
  Block {
    step_id: String,
    #[source]
    source: BlockError,
  },

  /// A block returned a result the runtime cannot record.
  #[error("invalid result from step '{step_id}': {message}")]
  InvalidResult { step_id: String, message: String },

  #[error("invalid graph: {message}")]
  InvalidGraph { message: String },

  #[error("execution cancelled")]
  Cancelled,
}

impl RuntimeError {
  /// The step the error is attributed to, if any.
  pub fn step_id(&self) -> Option<&str> {
    match self {
      RuntimeError::Addressing { step_id, .. }
      | RuntimeError::DuplicateKey { step_id }
      | RuntimeError::DimensionalityMismatch { step_id, .. }
      | RuntimeError::ModelInvocation { step_id, .. }
      | RuntimeError::UnsupportedStepType { step_id, .. }
      | RuntimeError::Block { step_id, .. }
      | RuntimeError::InvalidResult { step_id, .. } => Some(step_id),
      RuntimeError::MissingInput { .. }
      | RuntimeError::InvalidGraph { .. }
      | RuntimeError::Cancelled => None,
    }
  }

  /// Whether the failure was caused by the caller rather than infrastructure.
  pub fn is_user_error(&self) -> bool {
    match self {
      RuntimeError::ModelInvocation { source, .. } => source.is_user_error(),
      RuntimeError::Block { source, .. } => matches!(
        source,
        BlockError::MissingParameter { .. } | BlockError::InvalidParameter { .. }
      ),
      RuntimeError::MissingInput { .. } => true,
      _ => false,
    }
  }

  /// Attribute a block failure to its step.
  pub(crate) fn from_block(step_id: &str, error: BlockError) -> Self {
    match error {
      BlockError::Model(source) => RuntimeError::ModelInvocation {
        step_id: step_id.to_string(),
        source,
      },
      BlockError::Cancelled => RuntimeError::Cancelled,
      source => RuntimeError::Block {
        step_id: step_id.to_string(),
        source,
      },
    }
  }

  pub(crate) fn from_resolve(step_id: &str, error: ResolveError) -> Self {
    RuntimeError::Addressing {
      step_id: step_id.to_string(),
      message: error.to_string(),
    }
  }
}

/// A failed run, with everything committed before the failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
  pub execution_id: String,
  /// The failing step, when the failure is attributable to one.
  pub step_id: Option<String>,
  #[source]
  pub error: RuntimeError,
  /// Outputs written before the failure.
  pub lookup: OutputsLookup,
  pub statuses: HashMap<String, StepStatus>,
}
