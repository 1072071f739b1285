use async_trait::async_trait;
use lumen_block::{Block, BlockContext, BlockError, StepManifest, StepParams, StepResult};
use lumen_model::{DoctrOcrRequest, InferenceRequest};
use tracing::debug;

const DEFAULT_DOCTR_VERSION: &str = "default";

/// Text recognition with the doctr core model.
///
/// Called once per image; the dispatcher handles batches.
pub struct OcrBlock {
  manifest: StepManifest,
}

impl OcrBlock {
  pub fn new() -> Self {
    Self {
      manifest: StepManifest::new("OCRModel")
        .parameters(&["image", "doctr_version_id"])
        .outputs(&["result", "prediction_type"])
        .reference("image"),
    }
  }
}

impl Default for OcrBlock {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for OcrBlock {
  fn manifest(&self) -> &StepManifest {
    &self.manifest
  }

  async fn run(&self, params: StepParams, ctx: &BlockContext) -> Result<StepResult, BlockError> {
    let image = params
      .value("image")?
      .cloned()
      .ok_or_else(|| BlockError::MissingParameter {
        name: "image".to_string(),
      })?;
    let request = DoctrOcrRequest {
      api_key: ctx.api_key.clone(),
      image,
      doctr_version_id: params
        .parse("doctr_version_id")?
        .unwrap_or_else(|| DEFAULT_DOCTR_VERSION.to_string()),
    };
    let model_id = request.core_model_id();
    ctx.ensure_model_loaded(&model_id).await?;

    debug!(step_id = %ctx.step_id, model_id = %model_id, "running ocr");
    let mut records = ctx
      .infer(&model_id, InferenceRequest::Ocr(request))
      .await?
      .into_records();
    let mut record = match records.len() {
      1 => records.remove(0),
      n => {
        return Err(BlockError::Failed {
          message: format!("ocr returned {n} results for one image"),
        });
      }
    };
    record
      .entry("result".to_string())
      .or_insert(serde_json::Value::Null);
    record.insert(
      "prediction_type".to_string(),
      serde_json::Value::String("ocr".to_string()),
    );
    Ok(StepResult::Record(record))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::testing::context;

  #[tokio::test]
  async fn test_ocr_uses_core_model() {
    let (ctx, manager) = context(json!({
      "doctr/default": { "result": "HELLO" }
    }));
    let params = StepParams::new().with("image", json!({ "type": "url", "value": "a.jpg" }));

    let result = OcrBlock::new().run(params, &ctx).await.unwrap();
    let StepResult::Record(record) = result else {
      panic!("expected record");
    };
    assert_eq!(record["result"], "HELLO");
    assert_eq!(record["prediction_type"], "ocr");
    assert!(manager.loaded_models().contains("doctr/default"));
  }

  #[tokio::test]
  async fn test_ocr_version() {
    let (ctx, manager) = context(json!({
      "doctr/v2": { "result": "" }
    }));
    let params = StepParams::new()
      .with("image", json!("a"))
      .with("doctr_version_id", json!("v2"));

    OcrBlock::new().run(params, &ctx).await.unwrap();
    assert_eq!(manager.requests()[0].0, "doctr/v2");
  }
}
