//! Resolved parameter values.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::BlockError;
use crate::result::StepOutput;

/// A resolved parameter.
///
/// `Batch` is a batch dimension: batched image inputs or a sequence-valued
/// step output. A JSON array inside a record is a plain `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
  Value(serde_json::Value),
  Batch(Vec<ParamValue>),
}

impl ParamValue {
  /// Number of nested batch levels. An empty batch counts as one level.
  pub fn depth(&self) -> usize {
    match self {
      ParamValue::Value(_) => 0,
      ParamValue::Batch(items) => 1 + items.first().map_or(0, ParamValue::depth),
    }
  }

  /// Length of the outermost batch level.
  pub fn batch_len(&self) -> Option<usize> {
    match self {
      ParamValue::Batch(items) => Some(items.len()),
      ParamValue::Value(_) => None,
    }
  }

  pub fn as_value(&self) -> Option<&serde_json::Value> {
    match self {
      ParamValue::Value(value) => Some(value),
      ParamValue::Batch(_) => None,
    }
  }

  /// `null`, the placeholder for an absent value.
  pub fn is_empty(&self) -> bool {
    matches!(self, ParamValue::Value(serde_json::Value::Null))
  }

  /// Flatten to JSON; batches become arrays.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      ParamValue::Value(value) => value.clone(),
      ParamValue::Batch(items) => {
        serde_json::Value::Array(items.iter().map(ParamValue::to_json).collect())
      }
    }
  }
}

impl From<serde_json::Value> for ParamValue {
  fn from(value: serde_json::Value) -> Self {
    ParamValue::Value(value)
  }
}

impl From<&StepOutput> for ParamValue {
  fn from(output: &StepOutput) -> Self {
    match output {
      StepOutput::Record(record) => ParamValue::Value(serde_json::Value::Object(record.clone())),
      StepOutput::Sequence(items) => ParamValue::Batch(items.iter().map(ParamValue::from).collect()),
    }
  }
}

/// The resolved parameters handed to a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepParams {
  values: HashMap<String, ParamValue>,
}

impl StepParams {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
    self.values.insert(name.into(), value.into());
  }

  /// Builder-style insert.
  pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn get(&self, name: &str) -> Option<&ParamValue> {
    self.values.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.values.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
    self.values.iter()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// A non-batched parameter, or `None` when absent.
  pub fn value(&self, name: &str) -> Result<Option<&serde_json::Value>, BlockError> {
    match self.values.get(name) {
      None => Ok(None),
      Some(ParamValue::Value(value)) => Ok(Some(value)),
      Some(ParamValue::Batch(_)) => Err(BlockError::InvalidParameter {
        name: name.to_string(),
        message: "expected a single value, got a batch".to_string(),
      }),
    }
  }

  /// Deserialize a non-batched parameter. Absent and `null` both give `None`.
  pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, BlockError> {
    match self.value(name)? {
      None | Some(serde_json::Value::Null) => Ok(None),
      Some(value) => serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| BlockError::InvalidParameter {
          name: name.to_string(),
          message: e.to_string(),
        }),
    }
  }

  /// Deserialize a parameter that must be present.
  pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, BlockError> {
    self.parse(name)?.ok_or_else(|| BlockError::MissingParameter {
      name: name.to_string(),
    })
  }
}

impl FromIterator<(String, ParamValue)> for StepParams {
  fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().collect(),
    }
  }
}

impl IntoIterator for StepParams {
  type Item = (String, ParamValue);
  type IntoIter = std::collections::hash_map::IntoIter<String, ParamValue>;

  fn into_iter(self) -> Self::IntoIter {
    self.values.into_iter()
  }
}
