use serde::{Deserialize, Serialize};

/// A declared workflow output, addressed with a step output selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  pub name: String,
  pub selector: String,
}
