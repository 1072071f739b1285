/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Maximum number of steps dispatched at once.
  pub max_concurrency: usize,
  /// Credentials passed to the model collaborator.
  pub api_key: Option<String>,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 1,
      api_key: None,
    }
  }
}
