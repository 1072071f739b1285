use async_trait::async_trait;
use lumen_block::{
  Block, BlockContext, BlockError, Record, StepManifest, StepParams, StepResult,
};
use serde::Deserialize;
use serde_json::{Value, json};

/// A detection as returned by detection models: box center plus size.
#[derive(Debug, Deserialize)]
struct Detection {
  x: f64,
  y: f64,
  width: f64,
  height: f64,
  #[serde(default)]
  detection_id: Option<String>,
}

/// Cuts one crop per detection out of the parent image.
///
/// Adds a batch level: one image in, a sequence of crops out.
pub struct CropBlock {
  manifest: StepManifest,
}

impl CropBlock {
  pub fn new() -> Self {
    Self {
      manifest: StepManifest::new("Crop")
        .parameters(&["image", "predictions"])
        .outputs(&["crops", "parent_id"])
        .reference("image")
        .input_offset("predictions", 0)
        .output_offset(1),
    }
  }
}

impl Default for CropBlock {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for CropBlock {
  fn manifest(&self) -> &StepManifest {
    &self.manifest
  }

  async fn run(&self, params: StepParams, _ctx: &BlockContext) -> Result<StepResult, BlockError> {
    let image = params
      .value("image")?
      .cloned()
      .ok_or_else(|| BlockError::MissingParameter {
        name: "image".to_string(),
      })?;
    let detections = detections(&params)?;

    let crops = detections
      .into_iter()
      .enumerate()
      .map(|(index, detection)| {
        let detection_id = detection
          .detection_id
          .clone()
          .unwrap_or_else(|| index.to_string());
        let mut record = Record::new();
        record.insert(
          "crops".to_string(),
          json!({
            "type": "crop",
            "parent": image,
            "x_min": detection.x - detection.width / 2.0,
            "y_min": detection.y - detection.height / 2.0,
            "x_max": detection.x + detection.width / 2.0,
            "y_max": detection.y + detection.height / 2.0,
            "detection_id": detection_id,
          }),
        );
        record.insert("parent_id".to_string(), Value::String(detection_id));
        StepResult::Record(record)
      })
      .collect();
    Ok(StepResult::Sequence(crops))
  }
}

/// Accept either a bare detection list or a model record carrying one.
fn detections(params: &StepParams) -> Result<Vec<Detection>, BlockError> {
  let value = match params.value("predictions")? {
    None | Some(Value::Null) => {
      return Err(BlockError::MissingParameter {
        name: "predictions".to_string(),
      });
    }
    Some(Value::Object(record)) => record.get("predictions").cloned().unwrap_or(Value::Null),
    Some(other) => other.clone(),
  };
  serde_json::from_value(value).map_err(|e| BlockError::InvalidParameter {
    name: "predictions".to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::context;

  #[tokio::test]
  async fn test_one_crop_per_detection() {
    let (ctx, _) = context(json!({}));
    let params = StepParams::new().with("image", json!("img")).with(
      "predictions",
      json!([
        { "x": 10.0, "y": 10.0, "width": 4.0, "height": 2.0, "detection_id": "d1" },
        { "x": 50.0, "y": 40.0, "width": 10.0, "height": 10.0 }
      ]),
    );

    let result = CropBlock::new().run(params, &ctx).await.unwrap();
    let StepResult::Sequence(items) = result else {
      panic!("expected sequence");
    };
    assert_eq!(items.len(), 2);
    let StepResult::Record(first) = &items[0] else {
      panic!("expected record");
    };
    assert_eq!(first["parent_id"], "d1");
    assert_eq!(first["crops"]["x_min"], 8.0);
    assert_eq!(first["crops"]["y_max"], 11.0);
    assert_eq!(first["crops"]["parent"], "img");
    let StepResult::Record(second) = &items[1] else {
      panic!("expected record");
    };
    assert_eq!(second["parent_id"], "1");
  }

  #[tokio::test]
  async fn test_accepts_model_record() {
    let (ctx, _) = context(json!({}));
    let params = StepParams::new().with("image", json!("img")).with(
      "predictions",
      json!({ "predictions": [], "prediction_type": "object-detection" }),
    );

    let result = CropBlock::new().run(params, &ctx).await.unwrap();
    assert_eq!(result, StepResult::Sequence(vec![]));
  }

  #[tokio::test]
  async fn test_invalid_predictions() {
    let (ctx, _) = context(json!({}));
    let params = StepParams::new()
      .with("image", json!("img"))
      .with("predictions", json!("nope"));
    assert!(matches!(
      CropBlock::new().run(params, &ctx).await,
      Err(BlockError::InvalidParameter { .. })
    ));
  }
}
