//! Lumen Workflow
//!
//! This crate provides the "locked" workflow representation for lumen.
//! A locked workflow is the ordered step list the engine executes, together
//! with the dependency graph derived from the selectors in step parameters.
//!
//! Key differences from `lumen-config`:
//! - Step names are checked for uniqueness
//! - Data edges (`$steps.a.field`) and flow edges (`$steps.a`) are identified
//! - Steps keep their position in execution order

mod error;
mod graph;
mod step;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use step::Step;
pub use workflow::Workflow;
