use serde::{Deserialize, Serialize};

/// A structured record: field name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Raw model output: one record, or one record per image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceResponse {
  Single(Record),
  Many(Vec<Record>),
}

impl InferenceResponse {
  pub fn len(&self) -> usize {
    match self {
      InferenceResponse::Single(_) => 1,
      InferenceResponse::Many(records) => records.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn into_records(self) -> Vec<Record> {
    match self {
      InferenceResponse::Single(record) => vec![record],
      InferenceResponse::Many(records) => records,
    }
  }
}
