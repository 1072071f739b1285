//! Typed inference requests, one per model family.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
  pub model_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,
  /// A single image handle or an array of them.
  pub image: serde_json::Value,
  pub confidence: f64,
  pub disable_active_learning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetectionRequest {
  pub model_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,
  pub image: serde_json::Value,
  pub class_agnostic_nms: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_filter: Option<Vec<String>>,
  pub confidence: f64,
  pub iou_threshold: f64,
  pub max_detections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSegmentationRequest {
  #[serde(flatten)]
  pub detection: ObjectDetectionRequest,
  pub mask_decode_mode: String,
  pub tradeoff_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointsDetectionRequest {
  #[serde(flatten)]
  pub detection: ObjectDetectionRequest,
  pub keypoint_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctrOcrRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,
  pub image: serde_json::Value,
  pub doctr_version_id: String,
}

impl DoctrOcrRequest {
  /// Identifier of the core model serving this request, e.g. `doctr/default`.
  pub fn core_model_id(&self) -> String {
    format!("doctr/{}", self.doctr_version_id)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum InferenceRequest {
  Classification(ClassificationRequest),
  ObjectDetection(ObjectDetectionRequest),
  InstanceSegmentation(InstanceSegmentationRequest),
  KeypointsDetection(KeypointsDetectionRequest),
  Ocr(DoctrOcrRequest),
}

impl InferenceRequest {
  /// The image payload carried by the request.
  pub fn image(&self) -> &serde_json::Value {
    match self {
      InferenceRequest::Classification(r) => &r.image,
      InferenceRequest::ObjectDetection(r) => &r.image,
      InferenceRequest::InstanceSegmentation(r) => &r.detection.image,
      InferenceRequest::KeypointsDetection(r) => &r.detection.image,
      InferenceRequest::Ocr(r) => &r.image,
    }
  }

  /// Number of images in the request.
  pub fn image_count(&self) -> usize {
    match self.image() {
      serde_json::Value::Array(images) => images.len(),
      _ => 1,
    }
  }

  /// Short task name for logs.
  pub fn task(&self) -> &'static str {
    match self {
      InferenceRequest::Classification(_) => "classification",
      InferenceRequest::ObjectDetection(_) => "object_detection",
      InferenceRequest::InstanceSegmentation(_) => "instance_segmentation",
      InferenceRequest::KeypointsDetection(_) => "keypoints_detection",
      InferenceRequest::Ocr(_) => "ocr",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn detection() -> ObjectDetectionRequest {
    ObjectDetectionRequest {
      model_id: "vehicles/1".to_string(),
      api_key: None,
      image: json!([{ "type": "url", "value": "a.jpg" }, { "type": "url", "value": "b.jpg" }]),
      class_agnostic_nms: false,
      class_filter: None,
      confidence: 0.4,
      iou_threshold: 0.3,
      max_detections: 300,
    }
  }

  #[test]
  fn test_image_count() {
    let request = InferenceRequest::ObjectDetection(detection());
    assert_eq!(request.image_count(), 2);
    assert_eq!(request.task(), "object_detection");
  }

  #[test]
  fn test_flattened_serialization() {
    let request = InferenceRequest::KeypointsDetection(KeypointsDetectionRequest {
      detection: detection(),
      keypoint_confidence: 0.1,
    });
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["task"], "keypoints_detection");
    assert_eq!(value["model_id"], "vehicles/1");
    assert_eq!(value["keypoint_confidence"], 0.1);
    assert!(value.get("api_key").is_none());
  }

  #[test]
  fn test_core_model_id() {
    let request = DoctrOcrRequest {
      api_key: None,
      image: json!("img"),
      doctr_version_id: "default".to_string(),
    };
    assert_eq!(request.core_model_id(), "doctr/default");
  }
}
