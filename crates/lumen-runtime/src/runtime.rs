//! Workflow runtime.
//!
//! The [`Runtime`] struct is the main entry point for executing workflows.
//! It owns a workflow, its dependency graph and the block bound to every
//! step, and provides `invoke(inputs, cancel)` to execute the whole graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lumen_block::{Block, BlockContext, BlockRegistry, ModelServices, StepManifest};
use lumen_config::{FieldSelector, Selector};
use lumen_workflow::{Graph, Step, Workflow};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::dispatch::{Decision, Outcome, dispatch};
use crate::error::{ExecutionFailure, RuntimeError};
use crate::lookup::OutputsLookup;
use crate::resolve::{RuntimeInputs, resolve_step};
use crate::result::{ExecutionResult, StepStatus};

/// Spawned step dispatches, each tagged with its step id.
type StepTasks = JoinSet<(String, Result<Outcome, RuntimeError>)>;

/// Mutable state of one run. Only the driver loop touches it.
struct ExecutionState {
  execution_id: String,
  lookup: OutputsLookup,
  statuses: HashMap<String, StepStatus>,
  running: HashSet<String>,
}

impl ExecutionState {
  fn new(execution_id: String) -> Self {
    Self {
      execution_id,
      lookup: OutputsLookup::new(),
      statuses: HashMap::new(),
      running: HashSet::new(),
    }
  }

  fn is_pending(&self, step_id: &str) -> bool {
    !self.statuses.contains_key(step_id) && !self.running.contains(step_id)
  }

  fn skip(&mut self, step_id: &str, reason: &str) {
    if self.is_pending(step_id) {
      info!(
        execution_id = %self.execution_id,
        step_id = %step_id,
        reason = %reason,
        "step_skipped"
      );
      self
        .statuses
        .insert(step_id.to_string(), StepStatus::Skipped);
    }
  }
}

/// The workflow runtime.
///
/// Handles graph traversal, scheduling, and parameter resolution, and hands
/// each step to its block through the dispatcher.
pub struct Runtime {
  workflow: Workflow,
  graph: Graph,
  /// Block bound to each step, keyed by step name.
  blocks: HashMap<String, Arc<dyn Block>>,
  models: ModelServices,
  config: RuntimeConfig,
}

impl Runtime {
  /// Create a new runtime for the given workflow.
  ///
  /// Fails if a step's type has no registered block, or if a step reads a
  /// field its producer does not declare or a step that does not run
  /// before it.
  pub fn new(
    workflow: Workflow,
    registry: &BlockRegistry,
    models: ModelServices,
    config: RuntimeConfig,
  ) -> Result<Self, RuntimeError> {
    let mut blocks = HashMap::with_capacity(workflow.steps.len());
    for step in &workflow.steps {
      let block = registry
        .get(&step.step_type)
        .ok_or_else(|| RuntimeError::UnsupportedStepType {
          step_id: step.name.clone(),
          step_type: step.step_type.clone(),
        })?;
      blocks.insert(step.name.clone(), block);
    }

    let runtime = Self {
      graph: workflow.graph(),
      workflow,
      blocks,
      models,
      config,
    };
    runtime.validate_references()?;
    Ok(runtime)
  }

  /// Get a reference to the workflow.
  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  /// Manifest of the block bound to a step.
  pub fn manifest(&self, step_id: &str) -> Option<&StepManifest> {
    self.blocks.get(step_id).map(|block| block.manifest())
  }

  /// Execute the workflow with the given inputs.
  #[instrument(
    name = "runtime_invoke",
    skip(self, inputs, cancel),
    fields(
      workflow_id = %self.workflow.workflow_id,
    )
  )]
  pub async fn invoke(
    &self,
    inputs: serde_json::Map<String, serde_json::Value>,
    cancel: CancellationToken,
  ) -> Result<ExecutionResult, ExecutionFailure> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      workflow_id = %self.workflow.workflow_id,
      steps = self.workflow.steps.len(),
      "workflow_started"
    );

    let mut state = ExecutionState::new(execution_id.clone());
    let result = match RuntimeInputs::assemble(&self.workflow.inputs, &inputs) {
      Ok(inputs) => self.run_execution_loop(&inputs, &mut state, &cancel).await,
      Err(e) => Err(e),
    };

    match result {
      Ok(()) => {
        info!(
          execution_id = %execution_id,
          outputs = state.lookup.len(),
          "workflow_completed"
        );
        Ok(ExecutionResult {
          execution_id,
          lookup: state.lookup,
          statuses: state.statuses,
        })
      }
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "workflow_failed");
        Err(ExecutionFailure {
          execution_id,
          step_id: e.step_id().map(str::to_string),
          error: e,
          lookup: state.lookup,
          statuses: state.statuses,
        })
      }
    }
  }

  /// Execute a single step against the given inputs and outputs.
  ///
  /// This is for debugging: the step runs without walking the graph and its
  /// outcome is returned rather than recorded.
  #[instrument(
    name = "runtime_invoke_step",
    skip(self, inputs, lookup, cancel),
    fields(
      workflow_id = %self.workflow.workflow_id,
      step_id = %step_id,
    )
  )]
  pub async fn invoke_step(
    &self,
    step_id: &str,
    inputs: &RuntimeInputs,
    lookup: &OutputsLookup,
    cancel: CancellationToken,
  ) -> Result<Outcome, RuntimeError> {
    let step = self
      .workflow
      .get_step(step_id)
      .ok_or_else(|| RuntimeError::InvalidGraph {
        message: format!("step '{}' not found in workflow", step_id),
      })?;
    let block = self.block(step_id)?;
    let resolved = resolve_step(step, inputs, lookup)?;
    let ctx = self.context(uuid::Uuid::new_v4().to_string(), step_id, cancel);
    dispatch(block, resolved, ctx).await
  }

  /// Run the main execution loop.
  async fn run_execution_loop(
    &self,
    inputs: &RuntimeInputs,
    state: &mut ExecutionState,
    cancel: &CancellationToken,
  ) -> Result<(), RuntimeError> {
    let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
    // Cancelled on failure so in-flight siblings stop early
    let step_cancel = cancel.child_token();
    let mut tasks = StepTasks::new();

    let result = self
      .drive(inputs, state, cancel, &step_cancel, &semaphore, &mut tasks)
      .await;

    if result.is_err() {
      step_cancel.cancel();
      tasks.abort_all();
    }
    result?;

    let unsettled: Vec<&str> = self
      .workflow
      .steps
      .iter()
      .filter(|step| !state.statuses.contains_key(&step.name))
      .map(|step| step.name.as_str())
      .collect();
    if !unsettled.is_empty() {
      return Err(RuntimeError::InvalidGraph {
        message: format!("steps never became ready: {}", unsettled.join(", ")),
      });
    }
    Ok(())
  }

  async fn drive(
    &self,
    inputs: &RuntimeInputs,
    state: &mut ExecutionState,
    cancel: &CancellationToken,
    step_cancel: &CancellationToken,
    semaphore: &Arc<Semaphore>,
    tasks: &mut StepTasks,
  ) -> Result<(), RuntimeError> {
    loop {
      if cancel.is_cancelled() {
        warn!(execution_id = %state.execution_id, "workflow cancelled");
        return Err(RuntimeError::Cancelled);
      }

      self.skip_blocked_steps(state);
      self.spawn_ready_steps(inputs, state, step_cancel, semaphore, tasks)?;
      if tasks.is_empty() {
        return Ok(());
      }

      // Wait for the next step to finish
      let joined = tokio::select! {
        joined = tasks.join_next() => joined,
        _ = cancel.cancelled() => None,
      };
      let Some(joined) = joined else {
        warn!(
          execution_id = %state.execution_id,
          "workflow cancelled during step execution"
        );
        return Err(RuntimeError::Cancelled);
      };

      let (step_id, outcome) = joined.map_err(|e| RuntimeError::InvalidGraph {
        message: format!("step task join error: {}", e),
      })?;
      state.running.remove(&step_id);

      if let Err(e) = outcome.and_then(|outcome| self.record_outcome(state, &step_id, outcome)) {
        error!(
          execution_id = %state.execution_id,
          step_id = %step_id,
          error = %e,
          "step_failed"
        );
        return Err(e);
      }
    }
  }

  /// Resolve and spawn ready steps, in declared order, while permits last.
  fn spawn_ready_steps(
    &self,
    inputs: &RuntimeInputs,
    state: &mut ExecutionState,
    cancel: &CancellationToken,
    semaphore: &Arc<Semaphore>,
    tasks: &mut StepTasks,
  ) -> Result<(), RuntimeError> {
    for step in self.find_ready_steps(state) {
      let Ok(permit) = semaphore.clone().try_acquire_owned() else {
        break;
      };

      // Resolution sees every upstream output: all upstream steps have settled
      let resolved = resolve_step(step, inputs, &state.lookup)?;
      let block = self.block(&step.name)?;
      let ctx = self.context(state.execution_id.clone(), &step.name, cancel.clone());

      state.running.insert(step.name.clone());
      let step_id = step.name.clone();
      tasks.spawn(async move {
        let _permit = permit;
        let outcome = dispatch(block, resolved, ctx).await;
        (step_id, outcome)
      });
    }
    Ok(())
  }

  /// Pending steps whose upstream steps have all settled, in declared order.
  fn find_ready_steps(&self, state: &ExecutionState) -> Vec<&Step> {
    self
      .workflow
      .steps
      .iter()
      .filter(|step| state.is_pending(&step.name))
      .filter(|step| {
        self
          .graph
          .upstream(&step.name)
          .iter()
          .all(|up| state.statuses.contains_key(up))
      })
      .collect()
  }

  /// Skip every pending step with a skipped upstream step.
  fn skip_blocked_steps(&self, state: &mut ExecutionState) {
    loop {
      let blocked: Vec<String> = self
        .workflow
        .steps
        .iter()
        .filter(|step| state.is_pending(&step.name))
        .filter(|step| {
          self
            .graph
            .upstream(&step.name)
            .iter()
            .any(|up| state.statuses.get(up) == Some(&StepStatus::Skipped))
        })
        .map(|step| step.name.clone())
        .collect();
      if blocked.is_empty() {
        return;
      }
      for step_id in blocked {
        state.skip(&step_id, "upstream step skipped");
      }
    }
  }

  /// Record a finished step: data goes to the lookup, flow control skips
  /// successors.
  fn record_outcome(
    &self,
    state: &mut ExecutionState,
    step_id: &str,
    outcome: Outcome,
  ) -> Result<(), RuntimeError> {
    match outcome {
      Outcome::Output(output) => {
        let depth = output.depth();
        let len = output.len();
        state
          .lookup
          .write(step_id, output)
          .map_err(|_| RuntimeError::DuplicateKey {
            step_id: step_id.to_string(),
          })?;
        state
          .statuses
          .insert(step_id.to_string(), StepStatus::Completed);
        info!(
          execution_id = %state.execution_id,
          step_id = %step_id,
          depth,
          len,
          "step_completed"
        );
      }
      Outcome::Flow(decision) => {
        let skipped = self.skipped_successors(step_id, &decision)?;
        info!(
          execution_id = %state.execution_id,
          step_id = %step_id,
          decision = ?decision,
          skipped = ?skipped,
          "flow_control"
        );
        state
          .statuses
          .insert(step_id.to_string(), StepStatus::FlowControl);
        for successor in skipped {
          state.skip(&successor, "flow control");
        }
      }
    }
    Ok(())
  }

  /// Successors cut off by a flow-control decision.
  ///
  /// Steps further down are skipped through their skipped upstream.
  fn skipped_successors(
    &self,
    step_id: &str,
    decision: &Decision,
  ) -> Result<Vec<String>, RuntimeError> {
    let downstream = self.graph.downstream(step_id);
    match decision {
      Decision::Proceed => Ok(Vec::new()),
      Decision::Stop => Ok(downstream.to_vec()),
      Decision::Redirect(targets) => {
        if let Some(unknown) = targets
          .iter()
          .find(|target| self.workflow.get_step(target).is_none())
        {
          return Err(RuntimeError::Addressing {
            step_id: step_id.to_string(),
            message: format!("redirect target '{}' is not a step", unknown),
          });
        }
        Ok(
          downstream
            .iter()
            .filter(|successor| !targets.contains(*successor))
            .cloned()
            .collect(),
        )
      }
    }
  }

  /// Check that every data selector naming a known step reads a declared
  /// field of a step that runs earlier.
  fn validate_references(&self) -> Result<(), RuntimeError> {
    for step in &self.workflow.steps {
      let mut names: Vec<&String> = step.params.keys().collect();
      names.sort();
      for name in names {
        let Selector::StepOutput { step: producer, field } = Selector::parse(&step.params[name])
        else {
          continue;
        };
        let Some(producer_step) = self.workflow.get_step(producer) else {
          // Unknown steps are reported when the consumer resolves
          continue;
        };
        let addressing = |message: String| RuntimeError::Addressing {
          step_id: step.name.clone(),
          message,
        };
        if producer_step.index >= step.index {
          return Err(addressing(format!(
            "parameter '{}' reads step '{}', which does not run earlier",
            name, producer
          )));
        }
        if let FieldSelector::Named(field) = field
          && self
            .blocks
            .get(producer)
            .is_some_and(|block| !block.manifest().declares_output(field))
        {
          return Err(addressing(format!(
            "parameter '{}' reads '{}', which step '{}' does not declare",
            name, field, producer
          )));
        }
      }
    }
    Ok(())
  }

  fn block(&self, step_id: &str) -> Result<Arc<dyn Block>, RuntimeError> {
    self
      .blocks
      .get(step_id)
      .cloned()
      .ok_or_else(|| RuntimeError::InvalidGraph {
        message: format!("no block bound to step '{}'", step_id),
      })
  }

  fn context(&self, execution_id: String, step_id: &str, cancel: CancellationToken) -> BlockContext {
    BlockContext {
      execution_id,
      step_id: step_id.to_string(),
      api_key: self.config.api_key.clone(),
      models: self.models.clone(),
      cancel,
    }
  }
}
