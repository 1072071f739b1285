use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A step ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  /// Position in execution order.
  pub index: usize,
  pub name: String,
  pub step_type: String,
  /// Declared parameters: literal values or selector strings.
  pub params: HashMap<String, serde_json::Value>,
}
