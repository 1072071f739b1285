//! Step results and the outputs stored for later steps.

use serde::{Deserialize, Serialize};

use crate::Record;

/// A flow-control signal emitted instead of data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowControl {
  /// Stop execution of the emitting step's downstream branch.
  pub stop: bool,
  /// Continue at this step, skipping the branch's other successors.
  pub redirect: Option<String>,
}

impl FlowControl {
  /// Let downstream steps run as usual.
  pub fn proceed() -> Self {
    Self::default()
  }

  pub fn terminate() -> Self {
    Self {
      stop: true,
      redirect: None,
    }
  }

  pub fn redirect(target: impl Into<String>) -> Self {
    Self {
      stop: false,
      redirect: Some(target.into()),
    }
  }
}

/// What a block produces.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
  Record(Record),
  /// One element per batch element; elements may themselves be sequences.
  Sequence(Vec<StepResult>),
  FlowControl(FlowControl),
}

impl StepResult {
  /// Build a record result from a JSON object. Non-object values are stored
  /// under a `value` field.
  pub fn from_json(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Object(record) => StepResult::Record(record),
      other => {
        let mut record = Record::new();
        record.insert("value".to_string(), other);
        StepResult::Record(record)
      }
    }
  }

  /// Number of nested sequence levels.
  pub fn depth(&self) -> usize {
    match self {
      StepResult::Sequence(items) => 1 + items.first().map_or(0, StepResult::depth),
      _ => 0,
    }
  }
}

impl From<Record> for StepResult {
  fn from(record: Record) -> Self {
    StepResult::Record(record)
  }
}

impl From<FlowControl> for StepResult {
  fn from(flow: FlowControl) -> Self {
    StepResult::FlowControl(flow)
  }
}

/// A data result as stored in the outputs lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepOutput {
  Record(Record),
  Sequence(Vec<StepOutput>),
}

impl StepOutput {
  /// Number of nested sequence levels.
  pub fn depth(&self) -> usize {
    match self {
      StepOutput::Record(_) => 0,
      StepOutput::Sequence(items) => 1 + items.first().map_or(0, StepOutput::depth),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      StepOutput::Record(_) => 1,
      StepOutput::Sequence(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn as_record(&self) -> Option<&Record> {
    match self {
      StepOutput::Record(record) => Some(record),
      StepOutput::Sequence(_) => None,
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    match self {
      StepOutput::Record(record) => serde_json::Value::Object(record.clone()),
      StepOutput::Sequence(items) => {
        serde_json::Value::Array(items.iter().map(StepOutput::to_json).collect())
      }
    }
  }
}
