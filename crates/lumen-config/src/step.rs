use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single step of a workflow definition.
///
/// Every key other than `type` and `name` is a step parameter holding either a
/// literal or a selector string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  /// Type tag used to look up the step implementation.
  #[serde(rename = "type")]
  pub step_type: String,
  /// Unique step name within the workflow.
  pub name: String,
  #[serde(flatten)]
  pub params: HashMap<String, serde_json::Value>,
}

impl StepDef {
  pub fn new(step_type: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      step_type: step_type.into(),
      name: name.into(),
      params: HashMap::new(),
    }
  }

  /// Builder-style helper to add a parameter.
  pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.params.insert(key.into(), value);
    self
  }
}
