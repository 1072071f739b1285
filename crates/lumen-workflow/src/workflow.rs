use std::collections::HashSet;

use lumen_config::{InputDef, OutputDef, WorkflowDef};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::step::Step;

/// A locked workflow ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub inputs: Vec<InputDef>,
  /// Steps in execution order.
  pub steps: Vec<Step>,
  pub outputs: Vec<OutputDef>,
}

impl Workflow {
  /// Lock a workflow definition.
  ///
  /// Selectors are not checked here: a reference to an unknown step is left
  /// for the runtime to report when the step is resolved.
  pub fn from_def(workflow_id: impl Into<String>, def: WorkflowDef) -> Result<Self, WorkflowError> {
    let mut seen_inputs = HashSet::new();
    for input in &def.inputs {
      if !seen_inputs.insert(input.name().to_string()) {
        return Err(WorkflowError::DuplicateInput(input.name().to_string()));
      }
    }

    let mut seen_steps = HashSet::new();
    let mut steps = Vec::with_capacity(def.steps.len());
    for (index, step_def) in def.steps.into_iter().enumerate() {
      if !seen_steps.insert(step_def.name.clone()) {
        return Err(WorkflowError::DuplicateStep(step_def.name));
      }
      steps.push(Step {
        index,
        name: step_def.name,
        step_type: step_def.step_type,
        params: step_def.params,
      });
    }

    Ok(Self {
      workflow_id: workflow_id.into(),
      inputs: def.inputs,
      steps,
      outputs: def.outputs,
    })
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.steps)
  }

  /// Get a step by name.
  pub fn get_step(&self, name: &str) -> Option<&Step> {
    self.steps.iter().find(|s| s.name == name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn def(value: serde_json::Value) -> WorkflowDef {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_from_def_keeps_order() {
    let workflow = Workflow::from_def(
      "wf",
      def(json!({
        "inputs": [{ "type": "WorkflowImage", "name": "image" }],
        "steps": [
          { "type": "ObjectDetectionModel", "name": "b", "image": "$inputs.image" },
          { "type": "Crop", "name": "a", "image": "$inputs.image" }
        ]
      })),
    )
    .unwrap();

    let names: Vec<_> = workflow.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(workflow.steps[1].index, 1);
    assert_eq!(workflow.get_step("a").unwrap().step_type, "Crop");
  }

  #[test]
  fn test_duplicate_step_rejected() {
    let result = Workflow::from_def(
      "wf",
      def(json!({
        "steps": [
          { "type": "Crop", "name": "a" },
          { "type": "Crop", "name": "a" }
        ]
      })),
    );
    assert!(matches!(result, Err(WorkflowError::DuplicateStep(name)) if name == "a"));
  }

  #[test]
  fn test_duplicate_input_rejected() {
    let result = Workflow::from_def(
      "wf",
      def(json!({
        "inputs": [
          { "type": "WorkflowImage", "name": "image" },
          { "type": "WorkflowParameter", "name": "image" }
        ],
        "steps": []
      })),
    );
    assert!(matches!(result, Err(WorkflowError::DuplicateInput(_))));
  }
}
