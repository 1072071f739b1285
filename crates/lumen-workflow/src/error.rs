use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("duplicate step name: {0}")]
  DuplicateStep(String),

  #[error("duplicate input name: {0}")]
  DuplicateInput(String),
}
