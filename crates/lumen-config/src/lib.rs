//! Lumen Config
//!
//! This crate contains the serializable workflow definition types for lumen
//! and the selector grammar used to wire steps together.
//!
//! A definition declares workflow inputs, an ordered list of steps and the
//! workflow outputs. Step parameters are either literals or selectors:
//!
//! ```json
//! {
//!   "type": "ObjectDetectionModel",
//!   "name": "detection",
//!   "image": "$inputs.image",
//!   "model_id": "$inputs.model_id",
//!   "confidence": 0.5
//! }
//! ```
//!
//! Definitions are assumed to be validated before they reach the engine.

mod input;
mod output;
pub mod selector;
mod step;
mod workflow;

pub use input::InputDef;
pub use output::OutputDef;
pub use selector::{FieldSelector, Selector};
pub use step::StepDef;
pub use workflow::WorkflowDef;
