//! Execution result types.

use std::collections::HashMap;

use lumen_config::{FieldSelector, OutputDef, selector};
use serde::{Deserialize, Serialize};

use crate::lookup::OutputsLookup;

/// How a step settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  /// Produced data, recorded in the outputs lookup.
  Completed,
  /// Not executed because a flow-control step or a skipped upstream cut it off.
  Skipped,
  /// Emitted a flow-control signal instead of data.
  FlowControl,
}

/// Result of a complete workflow invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
  /// Unique execution ID.
  pub execution_id: String,
  pub lookup: OutputsLookup,
  /// Status of every step, keyed by step name.
  pub statuses: HashMap<String, StepStatus>,
}

impl ExecutionResult {
  pub fn status(&self, step_id: &str) -> Option<StepStatus> {
    self.statuses.get(step_id).copied()
  }

  /// Step names with the given status, sorted.
  pub fn steps_with_status(&self, status: StepStatus) -> Vec<&str> {
    let mut steps: Vec<&str> = self
      .statuses
      .iter()
      .filter(|(_, s)| **s == status)
      .map(|(id, _)| id.as_str())
      .collect();
    steps.sort_unstable();
    steps
  }

  /// Project the declared workflow outputs out of the lookup.
  ///
  /// Outputs of steps that produced no data read as `null`.
  pub fn project(&self, outputs: &[OutputDef]) -> serde_json::Map<String, serde_json::Value> {
    outputs
      .iter()
      .map(|output| {
        let value = selector::step_id_and_field(&output.selector)
          .and_then(|(step, field)| {
            let field = field.unwrap_or(FieldSelector::All);
            self.lookup.select(step, field).ok().map(|value| value.to_json())
          })
          .unwrap_or(serde_json::Value::Null);
        (output.name.clone(), value)
      })
      .collect()
  }
}
