//! Model-backed steps.
//!
//! Every model step resolves `model_id`, registers the model, builds the typed
//! request for its family and invokes the model collaborator. A single record
//! answering a single image is unwrapped to a bare record; batched images
//! always produce a sequence.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use lumen_block::{
  Block, BlockContext, BlockError, ParamValue, Record, RegistryError, StepManifest, StepParams,
  StepResult,
};
use lumen_model::{
  ClassificationRequest, InferenceRequest, InstanceSegmentationRequest, KeypointsDetectionRequest,
  ObjectDetectionRequest,
};
use tracing::debug;

/// Builds a request from resolved parameters, the image payload, the model id
/// and the api key.
type RequestConstructor =
  fn(&StepParams, serde_json::Value, String, Option<String>) -> Result<InferenceRequest, BlockError>;

struct ModelKind {
  step_type: &'static str,
  prediction_type: &'static str,
  parameters: &'static [&'static str],
  outputs: &'static [&'static str],
  constructor: RequestConstructor,
}

const CLASSIFICATION_PARAMETERS: &[&str] =
  &["image", "model_id", "confidence", "disable_active_learning"];
const DETECTION_PARAMETERS: &[&str] = &[
  "image",
  "model_id",
  "class_agnostic_nms",
  "class_filter",
  "confidence",
  "iou_threshold",
  "max_detections",
];
const SEGMENTATION_PARAMETERS: &[&str] = &[
  "image",
  "model_id",
  "class_agnostic_nms",
  "class_filter",
  "confidence",
  "iou_threshold",
  "max_detections",
  "mask_decode_mode",
  "tradeoff_factor",
];
const KEYPOINTS_PARAMETERS: &[&str] = &[
  "image",
  "model_id",
  "class_agnostic_nms",
  "class_filter",
  "confidence",
  "iou_threshold",
  "max_detections",
  "keypoint_confidence",
];
const DETECTION_OUTPUTS: &[&str] = &["image", "predictions", "prediction_type"];

const MODEL_KINDS: &[ModelKind] = &[
  ModelKind {
    step_type: "ClassificationModel",
    prediction_type: "classification",
    parameters: CLASSIFICATION_PARAMETERS,
    outputs: &["image", "predictions", "top", "confidence", "prediction_type"],
    constructor: construct_classification_request,
  },
  ModelKind {
    step_type: "MultiLabelClassificationModel",
    prediction_type: "classification",
    parameters: CLASSIFICATION_PARAMETERS,
    outputs: &["image", "predictions", "predicted_classes", "prediction_type"],
    constructor: construct_classification_request,
  },
  ModelKind {
    step_type: "ObjectDetectionModel",
    prediction_type: "object-detection",
    parameters: DETECTION_PARAMETERS,
    outputs: DETECTION_OUTPUTS,
    constructor: construct_object_detection_request,
  },
  ModelKind {
    step_type: "InstanceSegmentationModel",
    prediction_type: "instance-segmentation",
    parameters: SEGMENTATION_PARAMETERS,
    outputs: DETECTION_OUTPUTS,
    constructor: construct_instance_segmentation_request,
  },
  ModelKind {
    step_type: "KeypointsDetectionModel",
    prediction_type: "keypoint-detection",
    parameters: KEYPOINTS_PARAMETERS,
    outputs: DETECTION_OUTPUTS,
    constructor: construct_keypoints_detection_request,
  },
];

/// Step types served by [`ModelBlock`].
pub const MODEL_STEP_TYPES: [&str; 5] = [
  "ClassificationModel",
  "MultiLabelClassificationModel",
  "ObjectDetectionModel",
  "InstanceSegmentationModel",
  "KeypointsDetectionModel",
];

/// A model inference step.
pub struct ModelBlock {
  manifest: StepManifest,
  prediction_type: &'static str,
  constructor: RequestConstructor,
}

impl ModelBlock {
  /// Build the block for a step type.
  ///
  /// Fails when the step type has no request constructor.
  pub fn new(step_type: &str) -> Result<Self, RegistryError> {
    let kind = MODEL_KINDS
      .iter()
      .find(|k| k.step_type == step_type)
      .ok_or_else(|| RegistryError::NotFound {
        step_type: step_type.to_string(),
      })?;

    let manifest = StepManifest::new(kind.step_type)
      .parameters(kind.parameters)
      .outputs(kind.outputs)
      .reference("image")
      .batch_input();

    Ok(Self {
      manifest,
      prediction_type: kind.prediction_type,
      constructor: kind.constructor,
    })
  }

  /// Run inference for one batch level of images.
  fn infer_images<'a>(
    &'a self,
    image: &'a ParamValue,
    params: &'a StepParams,
    model_id: &'a str,
    ctx: &'a BlockContext,
  ) -> BoxFuture<'a, Result<StepResult, BlockError>> {
    async move {
      let batched = match image {
        ParamValue::Value(_) => false,
        ParamValue::Batch(items) if items.iter().any(|i| i.depth() > 0) => {
          // Nested batches: one model call per inner batch
          let mut results = Vec::with_capacity(items.len());
          for item in items {
            results.push(self.infer_images(item, params, model_id, ctx).await?);
          }
          return Ok(StepResult::Sequence(results));
        }
        ParamValue::Batch(_) => true,
      };

      let request = (self.constructor)(
        params,
        image.to_json(),
        model_id.to_string(),
        ctx.api_key.clone(),
      )?;
      debug!(
        step_id = %ctx.step_id,
        model_id = %model_id,
        task = request.task(),
        images = request.image_count(),
        "invoking model"
      );

      let mut records: Vec<Record> = ctx
        .infer(model_id, request)
        .await?
        .into_records()
        .into_iter()
        .map(|record| self.normalize(record))
        .collect();

      if !batched && records.len() == 1
        && let Some(record) = records.pop()
      {
        return Ok(StepResult::Record(record));
      }
      Ok(StepResult::Sequence(
        records.into_iter().map(StepResult::Record).collect(),
      ))
    }
    .boxed()
  }

  /// Make every declared output present and tag the prediction type.
  fn normalize(&self, mut record: Record) -> Record {
    record.insert(
      "prediction_type".to_string(),
      serde_json::Value::String(self.prediction_type.to_string()),
    );
    for output in &self.manifest.outputs {
      record
        .entry(output.clone())
        .or_insert(serde_json::Value::Null);
    }
    record
  }
}

#[async_trait]
impl Block for ModelBlock {
  fn manifest(&self) -> &StepManifest {
    &self.manifest
  }

  async fn run(&self, params: StepParams, ctx: &BlockContext) -> Result<StepResult, BlockError> {
    let model_id: String = params.require("model_id")?;
    ctx.ensure_model_loaded(&model_id).await?;

    let image = params.get("image").ok_or_else(|| BlockError::MissingParameter {
      name: "image".to_string(),
    })?;
    self.infer_images(image, &params, &model_id, ctx).await
  }
}

fn construct_classification_request(
  params: &StepParams,
  image: serde_json::Value,
  model_id: String,
  api_key: Option<String>,
) -> Result<InferenceRequest, BlockError> {
  Ok(InferenceRequest::Classification(ClassificationRequest {
    model_id,
    api_key,
    image,
    confidence: params.parse("confidence")?.unwrap_or(0.4),
    disable_active_learning: params.parse("disable_active_learning")?.unwrap_or(false),
  }))
}

fn detection_request(
  params: &StepParams,
  image: serde_json::Value,
  model_id: String,
  api_key: Option<String>,
) -> Result<ObjectDetectionRequest, BlockError> {
  Ok(ObjectDetectionRequest {
    model_id,
    api_key,
    image,
    class_agnostic_nms: params.parse("class_agnostic_nms")?.unwrap_or(false),
    class_filter: params.parse("class_filter")?,
    confidence: params.parse("confidence")?.unwrap_or(0.4),
    iou_threshold: params.parse("iou_threshold")?.unwrap_or(0.3),
    max_detections: params.parse("max_detections")?.unwrap_or(300),
  })
}

fn construct_object_detection_request(
  params: &StepParams,
  image: serde_json::Value,
  model_id: String,
  api_key: Option<String>,
) -> Result<InferenceRequest, BlockError> {
  Ok(InferenceRequest::ObjectDetection(detection_request(
    params, image, model_id, api_key,
  )?))
}

fn construct_instance_segmentation_request(
  params: &StepParams,
  image: serde_json::Value,
  model_id: String,
  api_key: Option<String>,
) -> Result<InferenceRequest, BlockError> {
  Ok(InferenceRequest::InstanceSegmentation(
    InstanceSegmentationRequest {
      detection: detection_request(params, image, model_id, api_key)?,
      mask_decode_mode: params
        .parse("mask_decode_mode")?
        .unwrap_or_else(|| "accurate".to_string()),
      tradeoff_factor: params.parse("tradeoff_factor")?.unwrap_or(0.0),
    },
  ))
}

fn construct_keypoints_detection_request(
  params: &StepParams,
  image: serde_json::Value,
  model_id: String,
  api_key: Option<String>,
) -> Result<InferenceRequest, BlockError> {
  Ok(InferenceRequest::KeypointsDetection(
    KeypointsDetectionRequest {
      detection: detection_request(params, image, model_id, api_key)?,
      keypoint_confidence: params.parse("keypoint_confidence")?.unwrap_or(0.0),
    },
  ))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::testing::context;

  #[test]
  fn test_unknown_step_type() {
    assert!(matches!(
      ModelBlock::new("LMM"),
      Err(RegistryError::NotFound { .. })
    ));
  }

  #[test]
  fn test_manifest() {
    let block = ModelBlock::new("ObjectDetectionModel").unwrap();
    let manifest = block.manifest();
    assert!(manifest.accepts_batch_input);
    assert_eq!(manifest.dimensionality_reference.as_deref(), Some("image"));
    assert!(manifest.declares_output("predictions"));
    manifest.validate().unwrap();
  }

  #[tokio::test]
  async fn test_single_image_is_unwrapped() {
    let (ctx, manager) = context(json!({
      "vehicles/1": { "predictions": [{ "class": "car" }] }
    }));
    let block = ModelBlock::new("ObjectDetectionModel").unwrap();
    let params = StepParams::new()
      .with("image", json!({ "type": "url", "value": "a.jpg" }))
      .with("model_id", json!("vehicles/1"))
      .with("confidence", json!(0.6));

    let result = block.run(params, &ctx).await.unwrap();
    let StepResult::Record(record) = result else {
      panic!("expected record, got {result:?}");
    };
    assert_eq!(record["predictions"], json!([{ "class": "car" }]));
    assert_eq!(record["prediction_type"], "object-detection");
    assert_eq!(record["image"], json!(null));

    let requests = manager.requests();
    assert_eq!(requests.len(), 1);
    let InferenceRequest::ObjectDetection(request) = &requests[0].1 else {
      panic!("expected detection request");
    };
    assert_eq!(request.confidence, 0.6);
    assert_eq!(request.iou_threshold, 0.3);
    assert_eq!(request.max_detections, 300);
    assert_eq!(request.api_key.as_deref(), Some("key"));
  }

  #[tokio::test]
  async fn test_batch_keeps_sequence() {
    let (ctx, manager) = context(json!({
      "vehicles/1": { "predictions": [] }
    }));
    let block = ModelBlock::new("InstanceSegmentationModel").unwrap();
    let params = StepParams::new()
      .with("image", ParamValue::Batch(vec![json!("a").into()]))
      .with("model_id", json!("vehicles/1"));

    let result = block.run(params, &ctx).await.unwrap();
    let StepResult::Sequence(items) = result else {
      panic!("expected sequence");
    };
    assert_eq!(items.len(), 1);

    let InferenceRequest::InstanceSegmentation(request) = &manager.requests()[0].1 else {
      panic!("expected segmentation request");
    };
    assert_eq!(request.mask_decode_mode, "accurate");
    assert_eq!(request.detection.image, json!(["a"]));
  }

  #[tokio::test]
  async fn test_nested_batch_calls_per_inner_batch() {
    let (ctx, manager) = context(json!({
      "vehicles/1": { "predictions": [] }
    }));
    let block = ModelBlock::new("ClassificationModel").unwrap();
    let image = ParamValue::Batch(vec![
      ParamValue::Batch(vec![json!("a").into(), json!("b").into()]),
      ParamValue::Batch(vec![json!("c").into()]),
    ]);
    let params = StepParams::new()
      .with("image", image)
      .with("model_id", json!("vehicles/1"));

    let result = block.run(params, &ctx).await.unwrap();
    assert_eq!(result.depth(), 2);
    assert_eq!(manager.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_missing_model_id() {
    let (ctx, _) = context(json!({}));
    let block = ModelBlock::new("ObjectDetectionModel").unwrap();
    let params = StepParams::new().with("image", json!("a"));
    assert!(matches!(
      block.run(params, &ctx).await,
      Err(BlockError::MissingParameter { .. })
    ));
  }

  #[tokio::test]
  async fn test_unknown_model_is_model_error() {
    let (ctx, _) = context(json!({}));
    let block = ModelBlock::new("KeypointsDetectionModel").unwrap();
    let params = StepParams::new()
      .with("image", json!("a"))
      .with("model_id", json!("missing/1"));
    assert!(matches!(
      block.run(params, &ctx).await,
      Err(BlockError::Model(_))
    ));
  }
}
