use serde::{Deserialize, Deserializer, Serialize};

/// A workflow-level input declaration.
///
/// Image inputs accept either a single image handle or an array of them; an
/// array is treated as a batch. Parameter inputs are always plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputDef {
  #[serde(rename = "WorkflowImage", alias = "InferenceImage")]
  Image { name: String },
  #[serde(rename = "WorkflowParameter", alias = "InferenceParameter")]
  Parameter {
    name: String,
    /// An explicit `null` is a default; only an absent field means none.
    #[serde(
      default,
      deserialize_with = "present",
      skip_serializing_if = "Option::is_none"
    )]
    default_value: Option<serde_json::Value>,
  },
}

impl InputDef {
  pub fn name(&self) -> &str {
    match self {
      InputDef::Image { name } | InputDef::Parameter { name, .. } => name,
    }
  }

  pub fn is_image(&self) -> bool {
    matches!(self, InputDef::Image { .. })
  }
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
  D: Deserializer<'de>,
{
  serde_json::Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_inputs() {
    let inputs: Vec<InputDef> = serde_json::from_value(json!([
      { "type": "WorkflowImage", "name": "image" },
      { "type": "WorkflowParameter", "name": "confidence", "default_value": 0.3 },
      { "type": "InferenceParameter", "name": "model_id" }
    ]))
    .unwrap();

    assert_eq!(
      inputs[0],
      InputDef::Image {
        name: "image".to_string()
      }
    );
    assert_eq!(
      inputs[1],
      InputDef::Parameter {
        name: "confidence".to_string(),
        default_value: Some(json!(0.3)),
      }
    );
    assert_eq!(inputs[2].name(), "model_id");
    assert!(!inputs[2].is_image());
  }

  #[test]
  fn test_null_default_is_kept() {
    let inputs: Vec<InputDef> = serde_json::from_value(json!([
      { "type": "WorkflowParameter", "name": "classes", "default_value": null },
      { "type": "WorkflowParameter", "name": "model_id" }
    ]))
    .unwrap();

    assert_eq!(
      inputs[0],
      InputDef::Parameter {
        name: "classes".to_string(),
        default_value: Some(serde_json::Value::Null),
      }
    );
    assert_eq!(
      inputs[1],
      InputDef::Parameter {
        name: "model_id".to_string(),
        default_value: None,
      }
    );
    assert_eq!(
      serde_json::to_value(&inputs[0]).unwrap(),
      json!({ "type": "WorkflowParameter", "name": "classes", "default_value": null })
    );
  }
}
