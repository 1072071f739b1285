use std::collections::{HashMap, HashSet};

use lumen_config::Selector;

use crate::step::Step;

/// Why one step follows another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKind {
  /// The downstream step reads an output of the upstream step.
  Data,
  /// The upstream step names the downstream step as a flow-control successor.
  Flow,
}

/// Graph structure for traversal and analysis.
///
/// Edges are derived from step parameters: `$steps.a.field` in step `b` is a
/// data edge `a -> b`; `$steps.c` in step `b` is a flow edge `b -> c`.
/// References to unknown steps produce no edge.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: step -> list of downstream steps.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step -> list of upstream steps.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from an ordered step list.
  pub fn new(steps: &[Step]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all steps
    for step in steps {
      adjacency.entry(step.name.clone()).or_default();
      reverse_adjacency.entry(step.name.clone()).or_default();
    }

    let known: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    let mut edges: Vec<(String, String)> = Vec::new();

    for step in steps {
      // Sort keys so edge order does not depend on map iteration order
      let mut keys: Vec<&String> = step.params.keys().collect();
      keys.sort();
      for key in keys {
        for (referenced, kind) in references(&step.params[key]) {
          if referenced == step.name || !known.contains(referenced) {
            continue;
          }
          let edge = match kind {
            EdgeKind::Data => (referenced.to_string(), step.name.clone()),
            EdgeKind::Flow => (step.name.clone(), referenced.to_string()),
          };
          if !edges.contains(&edge) {
            edges.push(edge);
          }
        }
      }
    }

    for (from, to) in edges {
      let downstream = adjacency.entry(from.clone()).or_default();
      if !downstream.contains(&to) {
        downstream.push(to.clone());
      }
      let upstream = reverse_adjacency.entry(to).or_default();
      if !upstream.contains(&from) {
        upstream.push(from);
      }
    }

    Self {
      adjacency,
      reverse_adjacency,
    }
  }

  /// Get downstream steps for a given step.
  pub fn downstream(&self, step: &str) -> &[String] {
    self
      .adjacency
      .get(step)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream steps for a given step.
  pub fn upstream(&self, step: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }
}

/// Step references found in a parameter value.
///
/// Top-level strings are classified; array elements are inspected for step
/// references only, so lists of flow-control successors produce flow edges.
fn references(value: &serde_json::Value) -> Vec<(&str, EdgeKind)> {
  match Selector::parse(value) {
    Selector::StepOutput { step, .. } => vec![(step, EdgeKind::Data)],
    Selector::Step { step } => vec![(step, EdgeKind::Flow)],
    Selector::Input { .. } => Vec::new(),
    Selector::Literal(serde_json::Value::Array(items)) => items
      .iter()
      .filter_map(|item| match Selector::parse(item) {
        Selector::Step { step } => Some((step, EdgeKind::Flow)),
        _ => None,
      })
      .collect(),
    Selector::Literal(_) => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn step(index: usize, name: &str, params: serde_json::Value) -> Step {
    Step {
      index,
      name: name.to_string(),
      step_type: "Test".to_string(),
      params: serde_json::from_value(params).unwrap(),
    }
  }

  #[test]
  fn test_data_edges() {
    let steps = vec![
      step(0, "detection", json!({ "image": "$inputs.image" })),
      step(
        1,
        "crop",
        json!({ "image": "$inputs.image", "predictions": "$steps.detection.predictions" }),
      ),
      step(2, "ocr", json!({ "image": "$steps.crop.crops" })),
    ];
    let graph = Graph::new(&steps);

    assert!(graph.upstream("detection").is_empty());
    assert_eq!(graph.upstream("crop"), &["detection".to_string()]);
    assert_eq!(graph.downstream("detection"), &["crop".to_string()]);
    assert_eq!(graph.downstream("crop"), &["ocr".to_string()]);
  }

  #[test]
  fn test_flow_edges() {
    let steps = vec![
      step(
        0,
        "condition",
        json!({ "step_if_true": "$steps.a", "step_if_false": "$steps.b" }),
      ),
      step(1, "a", json!({})),
      step(2, "b", json!({})),
      step(3, "gate", json!({ "next_steps": ["$steps.a", "literal"] })),
    ];
    let graph = Graph::new(&steps);

    assert_eq!(
      graph.downstream("condition"),
      &["b".to_string(), "a".to_string()]
    );
    assert_eq!(graph.upstream("a"), &["condition".to_string(), "gate".to_string()]);
    assert_eq!(graph.downstream("gate"), &["a".to_string()]);
    assert!(graph.upstream("condition").is_empty());
  }

  #[test]
  fn test_unknown_reference_has_no_edge() {
    let steps = vec![step(0, "a", json!({ "x": "$steps.unknown.field" }))];
    let graph = Graph::new(&steps);
    assert!(graph.upstream("a").is_empty());
    assert!(graph.downstream("a").is_empty());
  }
}
