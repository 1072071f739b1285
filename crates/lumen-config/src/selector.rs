//! Selector grammar.
//!
//! A step parameter is either a literal or a selector string:
//!
//! - `$inputs.<name>` reads a workflow input
//! - `$steps.<step>.<field>` reads one output field of a prior step
//! - `$steps.<step>.*` reads the whole result of a prior step
//! - `$steps.<step>` names a step without reading it (flow-control targets)
//!
//! Anything else, including numbers, booleans, arrays and objects, is a literal.
//! The functions here are pure and total: a string that does not match the
//! reference syntax is simply a literal.

use serde_json::Value;

pub const INPUTS_PREFIX: &str = "$inputs.";
pub const STEPS_PREFIX: &str = "$steps.";
pub const ALL_FIELDS: &str = "*";

/// Which part of a step output a selector reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector<'a> {
  /// `*`: the whole record or sequence.
  All,
  Named(&'a str),
}

/// Classification of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selector<'a> {
  Literal(&'a Value),
  Input {
    name: &'a str,
  },
  StepOutput {
    step: &'a str,
    field: FieldSelector<'a>,
  },
  Step {
    step: &'a str,
  },
}

impl<'a> Selector<'a> {
  /// Classify a parameter value.
  pub fn parse(value: &'a Value) -> Self {
    let Value::String(s) = value else {
      return Selector::Literal(value);
    };

    if let Some(name) = input_name(s) {
      return Selector::Input { name };
    }
    if let Some((step, field)) = step_id_and_field(s) {
      return match field {
        Some(field) => Selector::StepOutput { step, field },
        None => Selector::Step { step },
      };
    }
    Selector::Literal(value)
  }

  pub fn is_literal(&self) -> bool {
    matches!(self, Selector::Literal(_))
  }

  /// Name of the step this selector references, if any.
  pub fn referenced_step(&self) -> Option<&'a str> {
    match self {
      Selector::StepOutput { step, .. } | Selector::Step { step } => Some(step),
      _ => None,
    }
  }
}

/// Returns true if the value uses the reference syntax.
pub fn is_selector(value: &Value) -> bool {
  !Selector::parse(value).is_literal()
}

pub fn is_input_selector(value: &Value) -> bool {
  matches!(Selector::parse(value), Selector::Input { .. })
}

pub fn is_step_output_selector(value: &Value) -> bool {
  matches!(Selector::parse(value), Selector::StepOutput { .. })
}

/// Extract the input name from `$inputs.<name>`.
pub fn input_name(selector: &str) -> Option<&str> {
  selector
    .strip_prefix(INPUTS_PREFIX)
    .filter(|name| !name.is_empty())
}

/// Decompose `$steps.<step>[.<field>]` into the step name and optional field.
///
/// Returns `None` when the string is not a step reference.
pub fn step_id_and_field(selector: &str) -> Option<(&str, Option<FieldSelector<'_>>)> {
  let rest = selector.strip_prefix(STEPS_PREFIX)?;
  match rest.split_once('.') {
    Some((step, field)) if !step.is_empty() && !field.is_empty() => {
      let field = if field == ALL_FIELDS {
        FieldSelector::All
      } else {
        FieldSelector::Named(field)
      };
      Some((step, Some(field)))
    }
    Some(_) => None,
    None if !rest.is_empty() => Some((rest, None)),
    None => None,
  }
}

/// Build the selector naming a step, e.g. `$steps.detection`.
pub fn step_selector(step: &str) -> String {
  format!("{}{}", STEPS_PREFIX, step)
}

/// Build the selector reading one field of a step, e.g. `$steps.detection.predictions`.
pub fn step_output_selector(step: &str, field: &str) -> String {
  format!("{}{}.{}", STEPS_PREFIX, step, field)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_literals() {
    for value in [
      json!(1),
      json!(0.5),
      json!(true),
      json!(null),
      json!("plain text"),
      json!(["$inputs.image"]),
      json!({ "a": "$steps.x.y" }),
      json!("$inputs."),
      json!("$steps."),
      json!("$steps.a."),
      json!("$stepsa.b"),
    ] {
      assert_eq!(Selector::parse(&value), Selector::Literal(&value), "{value}");
      assert!(!is_selector(&value));
    }
  }

  #[test]
  fn test_input_selector() {
    let value = json!("$inputs.image");
    assert_eq!(Selector::parse(&value), Selector::Input { name: "image" });
    assert!(is_input_selector(&value));
    assert!(!is_step_output_selector(&value));
    assert_eq!(input_name("$inputs.image"), Some("image"));
    assert_eq!(input_name("$steps.image"), None);
  }

  #[test]
  fn test_step_output_selector() {
    let value = json!("$steps.detection.predictions");
    assert_eq!(
      Selector::parse(&value),
      Selector::StepOutput {
        step: "detection",
        field: FieldSelector::Named("predictions"),
      }
    );
    assert!(is_step_output_selector(&value));
  }

  #[test]
  fn test_step_output_wildcard() {
    let value = json!("$steps.detection.*");
    assert_eq!(
      Selector::parse(&value),
      Selector::StepOutput {
        step: "detection",
        field: FieldSelector::All,
      }
    );
  }

  #[test]
  fn test_step_reference() {
    let value = json!("$steps.crop");
    let selector = Selector::parse(&value);
    assert_eq!(selector, Selector::Step { step: "crop" });
    assert_eq!(selector.referenced_step(), Some("crop"));
    assert!(!is_step_output_selector(&value));
  }

  #[test]
  fn test_builders_round_trip() {
    assert_eq!(step_selector("a"), "$steps.a");
    assert_eq!(
      step_id_and_field(&step_output_selector("a", "b")),
      Some(("a", Some(FieldSelector::Named("b"))))
    );
  }
}
