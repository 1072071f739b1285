//! Lumen Model
//!
//! The model-invocation collaborator used by model-backed steps. The engine
//! never loads weights itself; it builds a typed [`InferenceRequest`], makes
//! sure the model is registered through [`LoadedModels`], and hands the
//! request to a [`ModelManager`].

mod cache;
mod error;
mod manager;
mod replay;
mod request;
mod response;

pub use cache::LoadedModels;
pub use error::ModelError;
pub use manager::ModelManager;
pub use replay::ReplayModelManager;
pub use request::{
  ClassificationRequest, DoctrOcrRequest, InferenceRequest, InstanceSegmentationRequest,
  KeypointsDetectionRequest, ObjectDetectionRequest,
};
pub use response::{InferenceResponse, Record};
