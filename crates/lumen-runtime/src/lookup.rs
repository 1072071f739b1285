//! Outputs lookup.
//!
//! The run-scoped table of step outputs. Entries are write-once and kept in
//! write order. Reads of a field broadcast over sequence outputs, so a
//! consumer reading `$steps.detection.predictions` gets one value per batch
//! element when `detection` ran over a batch.

use std::collections::HashMap;

use lumen_block::{ParamValue, StepOutput};
use lumen_config::FieldSelector;

use crate::error::LookupError;

#[derive(Debug, Clone, Default)]
pub struct OutputsLookup {
  entries: HashMap<String, StepOutput>,
  order: Vec<String>,
}

impl OutputsLookup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a step's output. Fails if the step already has an entry.
  pub fn write(&mut self, step_id: impl Into<String>, output: StepOutput) -> Result<(), LookupError> {
    let step_id = step_id.into();
    if self.entries.contains_key(&step_id) {
      return Err(LookupError::DuplicateKey { step_id });
    }
    self.order.push(step_id.clone());
    self.entries.insert(step_id, output);
    Ok(())
  }

  pub fn read(&self, step_id: &str) -> Result<&StepOutput, LookupError> {
    self
      .entries
      .get(step_id)
      .ok_or_else(|| LookupError::MissingKey {
        step_id: step_id.to_string(),
      })
  }

  /// Read one field, mapping the access over every element of a sequence.
  ///
  /// A record without the field reads as `null`.
  pub fn read_field(&self, step_id: &str, field: &str) -> Result<ParamValue, LookupError> {
    Ok(field_of(self.read(step_id)?, field))
  }

  /// Read through a parsed field selector; `*` reads the whole output.
  pub fn select(&self, step_id: &str, field: FieldSelector<'_>) -> Result<ParamValue, LookupError> {
    match field {
      FieldSelector::All => Ok(ParamValue::from(self.read(step_id)?)),
      FieldSelector::Named(field) => self.read_field(step_id, field),
    }
  }

  pub fn contains(&self, step_id: &str) -> bool {
    self.entries.contains_key(step_id)
  }

  /// Step ids in write order.
  pub fn step_ids(&self) -> impl Iterator<Item = &str> {
    self.order.iter().map(String::as_str)
  }

  /// Entries in write order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &StepOutput)> {
    self
      .order
      .iter()
      .filter_map(|id| self.entries.get(id).map(|output| (id.as_str(), output)))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// All entries as a JSON object keyed by step id.
  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Object(
      self
        .iter()
        .map(|(id, output)| (id.to_string(), output.to_json()))
        .collect(),
    )
  }
}

fn field_of(output: &StepOutput, field: &str) -> ParamValue {
  match output {
    StepOutput::Record(record) => {
      ParamValue::Value(record.get(field).cloned().unwrap_or(serde_json::Value::Null))
    }
    StepOutput::Sequence(items) => {
      ParamValue::Batch(items.iter().map(|item| field_of(item, field)).collect())
    }
  }
}
