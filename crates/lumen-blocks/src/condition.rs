//! Flow-control steps.
//!
//! `Condition` redirects execution to one of two steps. `ContinueIf` lets the
//! branch continue or stops it. Neither produces data.

use std::cmp::Ordering;

use async_trait::async_trait;
use lumen_block::{
  Block, BlockContext, BlockError, FlowControl, StepManifest, StepParams, StepResult,
};
use lumen_config::selector::STEPS_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Comparison between the `left` and `right` operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
  Equal,
  NotEqual,
  LowerThan,
  GreaterThan,
  LowerOrEqualThan,
  GreaterOrEqualThan,
  /// `left` is an element of the `right` array.
  In,
  StrStartsWith,
  StrEndsWith,
  StrContains,
}

impl Operator {
  pub fn evaluate(&self, left: &Value, right: &Value) -> Result<bool, BlockError> {
    match self {
      Operator::Equal => Ok(values_equal(left, right)),
      Operator::NotEqual => Ok(!values_equal(left, right)),
      Operator::LowerThan => Ok(compare(left, right)? == Ordering::Less),
      Operator::GreaterThan => Ok(compare(left, right)? == Ordering::Greater),
      Operator::LowerOrEqualThan => Ok(compare(left, right)? != Ordering::Greater),
      Operator::GreaterOrEqualThan => Ok(compare(left, right)? != Ordering::Less),
      Operator::In => match right {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(left, item))),
        Value::String(haystack) => Ok(haystack.contains(string_operand("left", left)?)),
        _ => Err(invalid("right", "expected an array or string")),
      },
      Operator::StrStartsWith => {
        Ok(string_operand("left", left)?.starts_with(string_operand("right", right)?))
      }
      Operator::StrEndsWith => {
        Ok(string_operand("left", left)?.ends_with(string_operand("right", right)?))
      }
      Operator::StrContains => {
        Ok(string_operand("left", left)?.contains(string_operand("right", right)?))
      }
    }
  }
}

/// Numbers compare by value regardless of integer or float encoding.
fn values_equal(left: &Value, right: &Value) -> bool {
  match (left.as_f64(), right.as_f64()) {
    (Some(l), Some(r)) => l == r,
    _ => left == right,
  }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, BlockError> {
  match (left, right) {
    (Value::Number(l), Value::Number(r)) => l
      .as_f64()
      .zip(r.as_f64())
      .and_then(|(l, r)| l.partial_cmp(&r))
      .ok_or_else(|| invalid("left", "numbers are not comparable")),
    (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
    _ => Err(invalid("left", "ordering needs two numbers or two strings")),
  }
}

fn string_operand<'a>(name: &str, value: &'a Value) -> Result<&'a str, BlockError> {
  value.as_str().ok_or_else(|| invalid(name, "expected a string"))
}

fn invalid(name: &str, message: &str) -> BlockError {
  BlockError::InvalidParameter {
    name: name.to_string(),
    message: message.to_string(),
  }
}

/// Evaluate `left <operator> right`. Absent operands compare as `null`.
fn evaluate(params: &StepParams) -> Result<bool, BlockError> {
  let operator: Operator = params.require("operator")?;
  let left = params.value("left")?.unwrap_or(&Value::Null);
  let right = params.value("right")?.unwrap_or(&Value::Null);
  operator.evaluate(left, right)
}

/// A step name, given either bare or as `$steps.<name>`.
fn step_name(params: &StepParams, name: &str) -> Result<String, BlockError> {
  let target: String = params.require(name)?;
  Ok(
    target
      .strip_prefix(STEPS_PREFIX)
      .map(str::to_string)
      .unwrap_or(target),
  )
}

/// Redirects execution to `step_if_true` or `step_if_false`.
pub struct ConditionBlock {
  manifest: StepManifest,
}

impl ConditionBlock {
  pub fn new() -> Self {
    Self {
      manifest: StepManifest::new("Condition")
        .parameters(&["left", "operator", "right", "step_if_true", "step_if_false"])
        .empty_values(),
    }
  }
}

impl Default for ConditionBlock {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for ConditionBlock {
  fn manifest(&self) -> &StepManifest {
    &self.manifest
  }

  async fn run(&self, params: StepParams, ctx: &BlockContext) -> Result<StepResult, BlockError> {
    let outcome = evaluate(&params)?;
    let target = if outcome {
      step_name(&params, "step_if_true")?
    } else {
      step_name(&params, "step_if_false")?
    };
    debug!(step_id = %ctx.step_id, outcome, target = %target, "condition evaluated");
    Ok(FlowControl::redirect(target).into())
  }
}

/// Lets the branch continue when the comparison holds, stops it otherwise.
pub struct ContinueIfBlock {
  manifest: StepManifest,
}

impl ContinueIfBlock {
  pub fn new() -> Self {
    Self {
      manifest: StepManifest::new("ContinueIf")
        .parameters(&["left", "operator", "right", "next_steps"])
        .empty_values(),
    }
  }
}

impl Default for ContinueIfBlock {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Block for ContinueIfBlock {
  fn manifest(&self) -> &StepManifest {
    &self.manifest
  }

  async fn run(&self, params: StepParams, ctx: &BlockContext) -> Result<StepResult, BlockError> {
    let outcome = evaluate(&params)?;
    debug!(step_id = %ctx.step_id, outcome, "continue_if evaluated");
    let flow = if outcome {
      FlowControl::proceed()
    } else {
      FlowControl::terminate()
    };
    Ok(flow.into())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::testing::context;

  #[test]
  fn test_operators() {
    let cases = [
      (Operator::Equal, json!(1), json!(1.0), true),
      (Operator::NotEqual, json!("a"), json!("b"), true),
      (Operator::LowerThan, json!(1), json!(2), true),
      (Operator::GreaterThan, json!(1), json!(2), false),
      (Operator::LowerOrEqualThan, json!(2), json!(2), true),
      (Operator::GreaterOrEqualThan, json!("b"), json!("a"), true),
      (Operator::In, json!("car"), json!(["car", "bus"]), true),
      (Operator::In, json!("dog"), json!(["car", "bus"]), false),
      (Operator::StrStartsWith, json!("vehicle"), json!("veh"), true),
      (Operator::StrEndsWith, json!("vehicle"), json!("cle"), true),
      (Operator::StrContains, json!("vehicle"), json!("hic"), true),
    ];
    for (operator, left, right, expected) in cases {
      assert_eq!(
        operator.evaluate(&left, &right).unwrap(),
        expected,
        "{operator:?} {left} {right}"
      );
    }
  }

  #[test]
  fn test_operator_names() {
    let operator: Operator = serde_json::from_value(json!("lower_or_equal_than")).unwrap();
    assert_eq!(operator, Operator::LowerOrEqualThan);
    let operator: Operator = serde_json::from_value(json!("in")).unwrap();
    assert_eq!(operator, Operator::In);
  }

  #[test]
  fn test_mismatched_ordering() {
    assert!(matches!(
      Operator::LowerThan.evaluate(&json!("a"), &json!(1)),
      Err(BlockError::InvalidParameter { .. })
    ));
  }

  #[tokio::test]
  async fn test_condition_redirects() {
    let (ctx, _) = context(json!({}));
    let params = StepParams::new()
      .with("left", json!(3))
      .with("operator", json!("greater_than"))
      .with("right", json!(2))
      .with("step_if_true", json!("big"))
      .with("step_if_false", json!("$steps.small"));

    let result = ConditionBlock::new().run(params.clone(), &ctx).await.unwrap();
    assert_eq!(result, StepResult::FlowControl(FlowControl::redirect("big")));

    let params = params.with("right", json!(5));
    let result = ConditionBlock::new().run(params, &ctx).await.unwrap();
    assert_eq!(result, StepResult::FlowControl(FlowControl::redirect("small")));
  }

  #[tokio::test]
  async fn test_continue_if() {
    let (ctx, _) = context(json!({}));
    let params = StepParams::new()
      .with("left", json!(null))
      .with("operator", json!("equal"))
      .with("right", json!(null))
      .with("next_steps", json!(["crop"]));
    let result = ContinueIfBlock::new().run(params.clone(), &ctx).await.unwrap();
    assert_eq!(result, StepResult::FlowControl(FlowControl::proceed()));

    let params = params.with("right", json!(1));
    let result = ContinueIfBlock::new().run(params, &ctx).await.unwrap();
    assert_eq!(result, StepResult::FlowControl(FlowControl::terminate()));
  }
}
