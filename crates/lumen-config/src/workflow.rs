use serde::{Deserialize, Serialize};

use crate::input::InputDef;
use crate::output::OutputDef;
use crate::step::StepDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default)]
  pub inputs: Vec<InputDef>,
  /// Steps in execution order.
  pub steps: Vec<StepDef>,
  #[serde(default)]
  pub outputs: Vec<OutputDef>,
}

fn default_version() -> String {
  "1.0".to_string()
}
