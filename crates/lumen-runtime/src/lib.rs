//! Lumen Runtime
//!
//! This crate executes locked workflows. It resolves every step parameter
//! against the workflow inputs and the outputs of earlier steps, dispatches
//! each step to its block with batch handling, and records results in an
//! [`OutputsLookup`].
//!
//! [`Runtime`] is the entry point; [`resolve`] and [`OutputsLookup`] are
//! exposed so callers can read outputs with the same selector semantics.

mod config;
mod dispatch;
mod error;
mod lookup;
mod resolve;
mod result;
mod runtime;

pub use config::RuntimeConfig;
pub use dispatch::{Decision, Outcome};
pub use error::{ExecutionFailure, LookupError, ResolveError, RuntimeError};
pub use lookup::OutputsLookup;
pub use resolve::{ResolvedParams, RuntimeInputs, resolve, resolve_step};
pub use result::{ExecutionResult, StepStatus};
pub use runtime::Runtime;
