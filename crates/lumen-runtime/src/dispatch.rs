//! Step dispatch.
//!
//! Checks a step's resolved parameters against its manifest, invokes the
//! block (once, or once per batch element for blocks that do not accept
//! batches) and turns the result into either an output for the lookup or a
//! flow-control decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use lumen_block::{
  Block, BlockContext, FlowControl, ParamValue, Record, StepManifest, StepOutput, StepParams,
  StepResult,
};
use tracing::{info, instrument};

use crate::error::RuntimeError;
use crate::resolve::ResolvedParams;

/// What a finished step asks of the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Output(StepOutput),
  Flow(Decision),
}

/// A flow-control decision for the emitting step's successors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  Proceed,
  /// Skip every successor.
  Stop,
  /// Skip every successor except these.
  Redirect(BTreeSet<String>),
}

impl Decision {
  fn from_signal(flow: FlowControl) -> Self {
    match flow {
      FlowControl {
        redirect: Some(target),
        ..
      } => Decision::Redirect(BTreeSet::from([target])),
      FlowControl { stop: true, .. } => Decision::Stop,
      FlowControl { .. } => Decision::Proceed,
    }
  }

  /// Combine the decisions of two batch elements. A successor is skipped only
  /// when both elements skip it.
  fn merge(self, other: Decision) -> Self {
    match (self, other) {
      (Decision::Proceed, _) | (_, Decision::Proceed) => Decision::Proceed,
      (Decision::Stop, other) | (other, Decision::Stop) => other,
      (Decision::Redirect(mut a), Decision::Redirect(b)) => {
        a.extend(b);
        Decision::Redirect(a)
      }
    }
  }
}

/// Run one step and convert its result.
#[instrument(
  name = "step",
  skip_all,
  fields(step_id = %ctx.step_id, step_type = %block.manifest().step_type)
)]
pub async fn dispatch(
  block: Arc<dyn Block>,
  resolved: ResolvedParams,
  ctx: BlockContext,
) -> Result<Outcome, RuntimeError> {
  info!(execution_id = %ctx.execution_id, "step_started");
  let result = execute(block.as_ref(), resolved, &ctx).await?;
  into_outcome(&ctx.step_id, result)
}

/// Invoke the block with dimensionality handling.
pub async fn execute(
  block: &dyn Block,
  resolved: ResolvedParams,
  ctx: &BlockContext,
) -> Result<StepResult, RuntimeError> {
  let manifest = block.manifest();
  let reference_depth = reference_depth(manifest, &resolved.params);
  let effective = check_dimensionality(manifest, &resolved, reference_depth, &ctx.step_id)?;

  if manifest.accepts_batch_input {
    return run_batch(block, resolved, effective, ctx).await;
  }

  // Levels the block collapses are handed to it whole
  let levels = reference_depth.min(effective);
  run_elements(block, resolved, levels, effective - levels, ctx).await
}

fn reference_depth(manifest: &StepManifest, params: &StepParams) -> usize {
  manifest
    .dimensionality_reference
    .as_deref()
    .and_then(|reference| params.get(reference))
    .map_or(0, ParamValue::depth)
}

fn reference_len(manifest: &StepManifest, params: &StepParams) -> Option<usize> {
  manifest
    .dimensionality_reference
    .as_deref()
    .and_then(|reference| params.get(reference))
    .and_then(ParamValue::batch_len)
}

/// Check input depths and return the effective output dimensionality.
fn check_dimensionality(
  manifest: &StepManifest,
  resolved: &ResolvedParams,
  reference_depth: usize,
  step_id: &str,
) -> Result<usize, RuntimeError> {
  let mismatch = |message: String| RuntimeError::DimensionalityMismatch {
    step_id: step_id.to_string(),
    message,
  };

  for (name, offset) in &manifest.input_dimensionality_offsets {
    let Some(value) = resolved.params.get(name) else {
      continue;
    };
    if !resolved.is_from_selector(name) {
      continue;
    }
    let expected = reference_depth as i64 + i64::from(*offset);
    if value.depth() as i64 != expected {
      return Err(mismatch(format!(
        "parameter '{}' has depth {}, expected {}",
        name,
        value.depth(),
        expected
      )));
    }
  }

  let effective = reference_depth as i64 + i64::from(manifest.output_dimensionality_offset);
  usize::try_from(effective)
    .map_err(|_| mismatch(format!("output dimensionality would be {}", effective)))
}

async fn invoke(
  block: &dyn Block,
  params: StepParams,
  ctx: &BlockContext,
) -> Result<StepResult, RuntimeError> {
  block
    .run(params, ctx)
    .await
    .map_err(|e| RuntimeError::from_block(&ctx.step_id, e))
}

/// Call a batch block once. Elements of the outer batch level with an empty
/// data parameter are left out of the call and filled with placeholders.
async fn run_batch(
  block: &dyn Block,
  resolved: ResolvedParams,
  effective: usize,
  ctx: &BlockContext,
) -> Result<StepResult, RuntimeError> {
  let manifest = block.manifest();
  let Some(len) = reference_len(manifest, &resolved.params) else {
    if has_empty_data(manifest, &resolved) {
      return Ok(placeholder(manifest, effective));
    }
    return invoke(block, resolved.params, ctx).await;
  };

  let empty: Vec<bool> = (0..len)
    .map(|index| element_is_empty(manifest, &resolved, index, len))
    .collect();
  let kept = empty.iter().filter(|is_empty| !**is_empty).count();

  let mut results = Vec::new();
  if kept > 0 {
    let params = if kept == len {
      resolved.params
    } else {
      kept_elements(&resolved.params, &empty)
    };
    match invoke(block, params, ctx).await? {
      StepResult::Sequence(items) if items.len() == kept => results = items,
      other => {
        return Err(RuntimeError::DimensionalityMismatch {
          step_id: ctx.step_id.clone(),
          message: format!(
            "expected a sequence of {} results, got {}",
            kept,
            describe(&other)
          ),
        });
      }
    }
  }
  if kept == len {
    return Ok(StepResult::Sequence(results));
  }

  let mut results = results.into_iter();
  let mut merged = Vec::with_capacity(len);
  for is_empty in empty {
    if is_empty {
      merged.push(placeholder(manifest, effective.saturating_sub(1)));
    } else if let Some(item) = results.next() {
      merged.push(item);
    }
  }
  Ok(StepResult::Sequence(merged))
}

/// Call a non-batch block once per element of the outer `levels` batch
/// levels of its reference parameter. `leaf_depth` is the depth the block
/// produces for one element.
fn run_elements<'a>(
  block: &'a dyn Block,
  resolved: ResolvedParams,
  levels: usize,
  leaf_depth: usize,
  ctx: &'a BlockContext,
) -> BoxFuture<'a, Result<StepResult, RuntimeError>> {
  async move {
    let manifest = block.manifest();
    let len = match levels {
      0 => None,
      _ => reference_len(manifest, &resolved.params),
    };

    let Some(len) = len else {
      if has_empty_data(manifest, &resolved) {
        return Ok(placeholder(manifest, leaf_depth));
      }
      return invoke(block, resolved.params, ctx).await;
    };

    let mut results = Vec::with_capacity(len);
    for index in 0..len {
      let element = element_params(&resolved, index, len, &ctx.step_id)?;
      if ctx.is_cancelled() {
        return Err(RuntimeError::Cancelled);
      }
      results.push(run_elements(block, element, levels - 1, leaf_depth, ctx).await?);
    }
    Ok(StepResult::Sequence(results))
  }
  .boxed()
}

/// Parameters for one batch element: equal-length batches are zipped,
/// everything else is broadcast.
fn element_params(
  resolved: &ResolvedParams,
  index: usize,
  len: usize,
  step_id: &str,
) -> Result<ResolvedParams, RuntimeError> {
  let mut params = StepParams::new();
  for (name, value) in resolved.params.iter() {
    let element = match value {
      ParamValue::Batch(items) if items.len() == len => items[index].clone(),
      ParamValue::Batch(items) => {
        return Err(RuntimeError::DimensionalityMismatch {
          step_id: step_id.to_string(),
          message: format!(
            "parameter '{}' has batch length {}, expected {}",
            name,
            items.len(),
            len
          ),
        });
      }
      value => value.clone(),
    };
    params.insert(name.clone(), element);
  }
  Ok(ResolvedParams {
    params,
    from_selector: resolved.from_selector.clone(),
  })
}

/// Batches of the outer length without the empty elements.
fn kept_elements(params: &StepParams, empty: &[bool]) -> StepParams {
  let mut kept = StepParams::new();
  for (name, value) in params.iter() {
    let value = match value {
      ParamValue::Batch(items) if items.len() == empty.len() => ParamValue::Batch(
        items
          .iter()
          .zip(empty)
          .filter(|(_, is_empty)| !**is_empty)
          .map(|(item, _)| item.clone())
          .collect(),
      ),
      value => value.clone(),
    };
    kept.insert(name.clone(), value);
  }
  kept
}

/// Parameters that carry the step's data: the dimensionality reference and
/// every parameter with a declared input offset. Other parameters may be
/// `null` legitimately.
fn data_parameters<'a>(
  manifest: &'a StepManifest,
  resolved: &'a ResolvedParams,
) -> impl Iterator<Item = &'a ParamValue> {
  manifest
    .dimensionality_reference
    .iter()
    .chain(manifest.input_dimensionality_offsets.keys())
    .filter(|name| resolved.is_from_selector(name))
    .filter_map(|name| resolved.params.get(name))
}

fn has_empty_data(manifest: &StepManifest, resolved: &ResolvedParams) -> bool {
  !manifest.accepts_empty_values && data_parameters(manifest, resolved).any(ParamValue::is_empty)
}

fn element_is_empty(
  manifest: &StepManifest,
  resolved: &ResolvedParams,
  index: usize,
  len: usize,
) -> bool {
  !manifest.accepts_empty_values
    && data_parameters(manifest, resolved).any(|value| match value {
      ParamValue::Batch(items) if items.len() == len => items[index].is_empty(),
      value => value.is_empty(),
    })
}

/// Stand-in for a step that was not invoked: a record of nulls over the
/// declared outputs, or an empty sequence when the step adds a level.
fn placeholder(manifest: &StepManifest, depth: usize) -> StepResult {
  if depth > 0 {
    return StepResult::Sequence(Vec::new());
  }
  let record: Record = manifest
    .outputs
    .iter()
    .map(|output| (output.clone(), serde_json::Value::Null))
    .collect();
  StepResult::Record(record)
}

/// Convert a block result into an output or a flow-control decision.
pub fn into_outcome(step_id: &str, result: StepResult) -> Result<Outcome, RuntimeError> {
  match result {
    StepResult::Record(record) => Ok(Outcome::Output(StepOutput::Record(record))),
    StepResult::FlowControl(flow) => Ok(Outcome::Flow(Decision::from_signal(flow))),
    StepResult::Sequence(items) => {
      let mut outputs = Vec::new();
      let mut decision: Option<Decision> = None;
      for item in items {
        match into_outcome(step_id, item)? {
          Outcome::Output(output) => outputs.push(output),
          Outcome::Flow(next) => {
            decision = Some(match decision {
              Some(current) => current.merge(next),
              None => next,
            });
          }
        }
      }
      match decision {
        None => Ok(Outcome::Output(StepOutput::Sequence(outputs))),
        Some(decision) if outputs.is_empty() => Ok(Outcome::Flow(decision)),
        Some(_) => Err(RuntimeError::InvalidResult {
          step_id: step_id.to_string(),
          message: "sequence mixes data and flow-control results".to_string(),
        }),
      }
    }
  }
}

fn describe(result: &StepResult) -> String {
  match result {
    StepResult::Record(_) => "a single record".to_string(),
    StepResult::Sequence(items) => format!("a sequence of {}", items.len()),
    StepResult::FlowControl(_) => "a flow-control signal".to_string(),
  }
}
