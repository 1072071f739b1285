//! Lumen Block
//!
//! The contract every step type satisfies. A block pairs a static
//! [`StepManifest`] (declared parameters, outputs and dimensionality
//! behaviour) with an async [`Block::run`] that turns resolved parameters into
//! a [`StepResult`].
//!
//! Blocks are registered by type tag in a [`BlockRegistry`]; the registry
//! validates each manifest when the block is registered, so a workflow can be
//! checked against it before any step runs.

mod block;
mod error;
mod manifest;
mod registry;
mod result;
mod value;

pub use block::{Block, BlockContext, ModelServices};
pub use error::{BlockError, RegistryError};
pub use lumen_model::Record;
pub use manifest::StepManifest;
pub use registry::BlockRegistry;
pub use result::{FlowControl, StepOutput, StepResult};
pub use value::{ParamValue, StepParams};
