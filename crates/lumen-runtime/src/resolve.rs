//! Parameter resolution.
//!
//! Resolution is stateless: every call reads the runtime inputs and the
//! outputs lookup as they are at that moment.

use std::collections::{HashMap, HashSet};

use lumen_block::{ParamValue, StepParams};
use lumen_config::{InputDef, Selector};
use lumen_workflow::Step;
use serde_json::Value;

use crate::error::{ResolveError, RuntimeError};
use crate::lookup::OutputsLookup;

/// Values supplied for the workflow inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct RuntimeInputs {
  values: HashMap<String, ParamValue>,
}

impl RuntimeInputs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&ParamValue> {
    self.values.get(name)
  }

  /// Bind caller-supplied values to the declared inputs.
  ///
  /// An image supplied as an array is a batch of images. Parameters fall
  /// back to their default value. Undeclared values are ignored.
  pub fn assemble(
    declared: &[InputDef],
    supplied: &serde_json::Map<String, Value>,
  ) -> Result<Self, RuntimeError> {
    let mut inputs = Self::new();
    for input in declared {
      let value = match (input, supplied.get(input.name())) {
        (InputDef::Image { .. }, Some(Value::Array(images))) => {
          ParamValue::Batch(images.iter().cloned().map(ParamValue::Value).collect())
        }
        (_, Some(value)) => ParamValue::Value(value.clone()),
        (
          InputDef::Parameter {
            default_value: Some(default),
            ..
          },
          None,
        ) => ParamValue::Value(default.clone()),
        (_, None) => {
          return Err(RuntimeError::MissingInput {
            name: input.name().to_string(),
          });
        }
      };
      inputs.insert(input.name(), value);
    }
    Ok(inputs)
  }
}

/// Resolve one parameter value.
///
/// Literals come back unchanged. `$steps.<step>` resolves to the step name.
pub fn resolve(
  value: &Value,
  inputs: &RuntimeInputs,
  lookup: &OutputsLookup,
) -> Result<ParamValue, ResolveError> {
  match Selector::parse(value) {
    Selector::Literal(value) => Ok(ParamValue::Value(value.clone())),
    Selector::Input { name } => inputs
      .get(name)
      .cloned()
      .ok_or_else(|| ResolveError::UnboundInput {
        name: name.to_string(),
      }),
    Selector::StepOutput { step, field } => Ok(lookup.select(step, field)?),
    Selector::Step { step } => Ok(ParamValue::Value(Value::String(step.to_string()))),
  }
}

/// A step's parameters after resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedParams {
  pub params: StepParams,
  /// Parameters whose value came from an input or step output.
  pub from_selector: HashSet<String>,
}

impl ResolvedParams {
  pub fn is_from_selector(&self, name: &str) -> bool {
    self.from_selector.contains(name)
  }
}

/// Resolve every parameter of a step.
pub fn resolve_step(
  step: &Step,
  inputs: &RuntimeInputs,
  lookup: &OutputsLookup,
) -> Result<ResolvedParams, RuntimeError> {
  let mut resolved = ResolvedParams::default();
  for (name, value) in &step.params {
    let selector = Selector::parse(value);
    if matches!(selector, Selector::Input { .. } | Selector::StepOutput { .. }) {
      resolved.from_selector.insert(name.clone());
    }
    let value =
      resolve(value, inputs, lookup).map_err(|e| RuntimeError::from_resolve(&step.name, e))?;
    resolved.params.insert(name.clone(), value);
  }
  Ok(resolved)
}

#[cfg(test)]
mod tests {
  use lumen_block::StepOutput;
  use serde_json::json;

  use super::*;

  fn lookup() -> OutputsLookup {
    let mut lookup = OutputsLookup::new();
    let output: StepOutput =
      serde_json::from_value(json!([{ "predictions": [1] }, { "predictions": [2] }])).unwrap();
    lookup.write("detection", output).unwrap();
    lookup
  }

  #[test]
  fn test_literals_are_identity() {
    let inputs = RuntimeInputs::new();
    let lookup = OutputsLookup::new();
    for value in [json!(0.4), json!("car"), json!([1, 2]), json!({ "$steps.a.b": 1 })] {
      let first = resolve(&value, &inputs, &lookup).unwrap();
      assert_eq!(first, ParamValue::Value(value.clone()));
      assert_eq!(resolve(&value, &inputs, &lookup).unwrap(), first);
    }
  }

  #[test]
  fn test_input_ref() {
    let mut inputs = RuntimeInputs::new();
    inputs.insert("image", json!({ "type": "url", "value": "a.jpg" }));
    let value = resolve(&json!("$inputs.image"), &inputs, &OutputsLookup::new()).unwrap();
    assert_eq!(value, ParamValue::Value(json!({ "type": "url", "value": "a.jpg" })));

    assert!(matches!(
      resolve(&json!("$inputs.missing"), &inputs, &OutputsLookup::new()),
      Err(ResolveError::UnboundInput { name }) if name == "missing"
    ));
  }

  #[test]
  fn test_step_refs() {
    let inputs = RuntimeInputs::new();
    let lookup = lookup();

    let field = resolve(&json!("$steps.detection.predictions"), &inputs, &lookup).unwrap();
    assert_eq!(field.batch_len(), Some(2));

    let all = resolve(&json!("$steps.detection.*"), &inputs, &lookup).unwrap();
    assert_eq!(all.to_json(), json!([{ "predictions": [1] }, { "predictions": [2] }]));

    let name = resolve(&json!("$steps.detection"), &inputs, &lookup).unwrap();
    assert_eq!(name, ParamValue::Value(json!("detection")));

    assert!(matches!(
      resolve(&json!("$steps.unknown.field"), &inputs, &lookup),
      Err(ResolveError::Lookup(_))
    ));
  }

  #[test]
  fn test_assemble() {
    let declared: Vec<InputDef> = serde_json::from_value(json!([
      { "type": "WorkflowImage", "name": "image" },
      { "type": "WorkflowParameter", "name": "confidence", "default_value": 0.4 },
      { "type": "WorkflowParameter", "name": "classes" }
    ]))
    .unwrap();
    let supplied = json!({ "image": ["a", "b"], "classes": ["car"], "extra": 1 });
    let supplied = supplied.as_object().unwrap();

    let inputs = RuntimeInputs::assemble(&declared, supplied).unwrap();
    assert_eq!(inputs.get("image").unwrap().batch_len(), Some(2));
    assert_eq!(inputs.get("confidence"), Some(&ParamValue::Value(json!(0.4))));
    assert_eq!(inputs.get("classes"), Some(&ParamValue::Value(json!(["car"]))));
    assert!(inputs.get("extra").is_none());

    let supplied = json!({ "image": "a" });
    assert!(matches!(
      RuntimeInputs::assemble(&declared, supplied.as_object().unwrap()),
      Err(RuntimeError::MissingInput { name }) if name == "classes"
    ));
  }

  #[test]
  fn test_assemble_null_default() {
    let declared: Vec<InputDef> = serde_json::from_value(json!([
      { "type": "WorkflowParameter", "name": "classes", "default_value": null }
    ]))
    .unwrap();

    let inputs = RuntimeInputs::assemble(&declared, &serde_json::Map::new()).unwrap();
    assert_eq!(inputs.get("classes"), Some(&ParamValue::Value(json!(null))));
  }

  #[test]
  fn test_resolve_step_tracks_selectors() {
    let step = Step {
      index: 0,
      name: "crop".to_string(),
      step_type: "Crop".to_string(),
      params: HashMap::from([
        ("image".to_string(), json!("$inputs.image")),
        ("predictions".to_string(), json!("$steps.detection.predictions")),
        ("label".to_string(), json!("x")),
      ]),
    };
    let mut inputs = RuntimeInputs::new();
    inputs.insert("image", json!("img"));

    let resolved = resolve_step(&step, &inputs, &lookup()).unwrap();
    assert!(resolved.is_from_selector("image"));
    assert!(resolved.is_from_selector("predictions"));
    assert!(!resolved.is_from_selector("label"));
    assert_eq!(resolved.params.len(), 3);
  }
}
