use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lumen_block::ModelServices;
use lumen_config::WorkflowDef;
use lumen_model::ReplayModelManager;
use lumen_runtime::{Runtime, RuntimeConfig};
use lumen_workflow::Workflow;

/// Lumen - A declarative workflow engine for vision model pipelines
#[derive(Parser)]
#[command(name = "lumen")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.lumen)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow
  Run {
    /// Path to the workflow definition (JSON)
    workflow_file: PathBuf,

    /// Runtime inputs (JSON object); read from stdin when omitted
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Recorded model responses (default: <data_dir>/responses.json)
    #[arg(long)]
    responses: Option<PathBuf>,

    /// Maximum number of steps running at once
    #[arg(long, default_value_t = 1)]
    max_concurrency: usize,

    /// API key passed to the model manager
    #[arg(long, env = "LUMEN_API_KEY")]
    api_key: Option<String>,
  },

  /// List the registered step types
  Blocks,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".lumen"),
  };

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      inputs,
      responses,
      max_concurrency,
      api_key,
    }) => {
      let responses = responses.unwrap_or_else(|| data_dir.join("responses.json"));
      let config = RuntimeConfig {
        max_concurrency,
        api_key,
      };
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_workflow(workflow_file, inputs, responses, config))?;
    }
    Some(Commands::Blocks) => list_blocks()?,
    None => {
      println!("lumen - use --help to see available commands");
    }
  }

  Ok(())
}

async fn run_workflow(
  workflow_file: PathBuf,
  inputs_file: Option<PathBuf>,
  responses_file: PathBuf,
  config: RuntimeConfig,
) -> Result<()> {
  // Read workflow definition
  let workflow_content = tokio::fs::read_to_string(&workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let workflow_def: WorkflowDef = serde_json::from_str(&workflow_content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  let workflow = Workflow::from_def(workflow_id(&workflow_file), workflow_def)
    .context("invalid workflow definition")?;
  eprintln!(
    "Loaded workflow: {} ({} steps)",
    workflow.workflow_id,
    workflow.steps.len()
  );

  let inputs = match inputs_file {
    Some(path) => read_inputs_from_file(&path).await?,
    None => read_inputs_from_stdin()?,
  };

  let manager = ReplayModelManager::from_file(&responses_file)
    .await
    .with_context(|| format!("failed to load model responses: {}", responses_file.display()))?;

  let registry = lumen_blocks::core_registry().context("failed to register blocks")?;
  let runtime = Runtime::new(
    workflow,
    &registry,
    ModelServices::new(Arc::new(manager)),
    config,
  )
  .context("failed to create runtime")?;

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });

  let result = match runtime.invoke(inputs, cancel).await {
    Ok(result) => result,
    Err(failure) => {
      eprintln!(
        "Partial outputs: {}",
        serde_json::to_string_pretty(&failure.lookup.to_json())?
      );
      return Err(failure).context("workflow execution failed");
    }
  };

  eprintln!("Execution completed: {}", result.execution_id);
  eprintln!("Steps with output: {}", result.lookup.len());

  let output = serde_json::json!({
    "execution_id": result.execution_id,
    "outputs": result.project(&runtime.workflow().outputs),
    "statuses": result.statuses,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

fn list_blocks() -> Result<()> {
  let registry = lumen_blocks::core_registry().context("failed to register blocks")?;
  for manifest in registry.manifests() {
    println!("{}", manifest.step_type);
    println!("  parameters: {}", manifest.parameters.join(", "));
    println!("  outputs:    {}", manifest.outputs.join(", "));
    if let Some(reference) = &manifest.dimensionality_reference {
      println!(
        "  batching:   reference '{}', output offset {}, batch input {}",
        reference, manifest.output_dimensionality_offset, manifest.accepts_batch_input
      );
    }
  }
  Ok(())
}

/// The workflow file name without extension.
fn workflow_id(path: &Path) -> String {
  path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| "workflow".to_string())
}

async fn read_inputs_from_file(path: &Path) -> Result<serde_json::Map<String, serde_json::Value>> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read inputs file: {}", path.display()))?;
  parse_inputs(&content).with_context(|| format!("failed to parse inputs file: {}", path.display()))
}

fn read_inputs_from_stdin() -> Result<serde_json::Map<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, no inputs
    return Ok(serde_json::Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read inputs from stdin")?;
  if input.trim().is_empty() {
    return Ok(serde_json::Map::new());
  }
  parse_inputs(&input).context("failed to parse inputs JSON from stdin")
}

fn parse_inputs(content: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
  match serde_json::from_str(content)? {
    serde_json::Value::Object(map) => Ok(map),
    other => anyhow::bail!("inputs must be a JSON object, got {}", other),
  }
}
