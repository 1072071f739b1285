use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Static description of a step type.
///
/// Dimensionality is expressed relative to the reference parameter: the
/// step's output sits `output_dimensionality_offset` levels away from the
/// reference parameter's batch depth, and a parameter with an input offset
/// `o` is expected at `depth(reference) + o`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepManifest {
  /// Type tag, e.g. `"ObjectDetectionModel"`.
  pub step_type: String,
  /// Declared parameter names.
  pub parameters: Vec<String>,
  /// Declared output field names.
  pub outputs: Vec<String>,
  #[serde(default)]
  pub input_dimensionality_offsets: HashMap<String, i32>,
  #[serde(default)]
  pub dimensionality_reference: Option<String>,
  #[serde(default)]
  pub output_dimensionality_offset: i32,
  /// The block takes batched parameters in one call.
  #[serde(default)]
  pub accepts_batch_input: bool,
  /// The block runs even when a selector-fed parameter is `null`.
  #[serde(default)]
  pub accepts_empty_values: bool,
}

impl StepManifest {
  pub fn new(step_type: impl Into<String>) -> Self {
    Self {
      step_type: step_type.into(),
      parameters: Vec::new(),
      outputs: Vec::new(),
      input_dimensionality_offsets: HashMap::new(),
      dimensionality_reference: None,
      output_dimensionality_offset: 0,
      accepts_batch_input: false,
      accepts_empty_values: false,
    }
  }

  pub fn parameters(mut self, names: &[&str]) -> Self {
    self.parameters = names.iter().map(|s| s.to_string()).collect();
    self
  }

  pub fn outputs(mut self, names: &[&str]) -> Self {
    self.outputs = names.iter().map(|s| s.to_string()).collect();
    self
  }

  pub fn input_offset(mut self, parameter: &str, offset: i32) -> Self {
    self
      .input_dimensionality_offsets
      .insert(parameter.to_string(), offset);
    self
  }

  pub fn reference(mut self, parameter: &str) -> Self {
    self.dimensionality_reference = Some(parameter.to_string());
    self
  }

  pub fn output_offset(mut self, offset: i32) -> Self {
    self.output_dimensionality_offset = offset;
    self
  }

  pub fn batch_input(mut self) -> Self {
    self.accepts_batch_input = true;
    self
  }

  pub fn empty_values(mut self) -> Self {
    self.accepts_empty_values = true;
    self
  }

  /// Declared input offset of a parameter, 0 when undeclared.
  pub fn input_dimensionality_offset(&self, parameter: &str) -> i32 {
    self
      .input_dimensionality_offsets
      .get(parameter)
      .copied()
      .unwrap_or(0)
  }

  pub fn declares_parameter(&self, name: &str) -> bool {
    self.parameters.iter().any(|p| p == name)
  }

  pub fn declares_output(&self, field: &str) -> bool {
    self.outputs.iter().any(|o| o == field)
  }

  /// Check the manifest is internally consistent.
  pub fn validate(&self) -> Result<(), RegistryError> {
    let invalid = |message: String| RegistryError::InvalidManifest {
      step_type: self.step_type.clone(),
      message,
    };

    if self.step_type.is_empty() {
      return Err(invalid("step type must not be empty".to_string()));
    }

    let mut seen = HashSet::new();
    for parameter in &self.parameters {
      if matches!(parameter.as_str(), "type" | "name") {
        return Err(invalid(format!("parameter name '{}' is reserved", parameter)));
      }
      if !seen.insert(parameter) {
        return Err(invalid(format!("duplicate parameter '{}'", parameter)));
      }
    }

    let mut seen = HashSet::new();
    for output in &self.outputs {
      if output == "*" || !seen.insert(output) {
        return Err(invalid(format!("invalid or duplicate output '{}'", output)));
      }
    }

    if let Some(reference) = &self.dimensionality_reference
      && !self.declares_parameter(reference)
    {
      return Err(invalid(format!(
        "dimensionality reference '{}' is not a declared parameter",
        reference
      )));
    }

    for parameter in self.input_dimensionality_offsets.keys() {
      if !self.declares_parameter(parameter) {
        return Err(invalid(format!(
          "dimensionality offset declared for unknown parameter '{}'",
          parameter
        )));
      }
    }

    let has_offsets = self.output_dimensionality_offset != 0
      || self.input_dimensionality_offsets.values().any(|o| *o != 0);
    if has_offsets && self.dimensionality_reference.is_none() {
      return Err(invalid(
        "dimensionality offsets require a dimensionality reference parameter".to_string(),
      ));
    }

    Ok(())
  }
}
