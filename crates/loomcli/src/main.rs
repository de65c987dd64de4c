// crates/loomcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loomcore::edits::{AddDataflowInput, AddDataflowOutput, AddProcessor, Connect};
use loomcore::{
    json_to_value, value_to_json, ActivityEvent, ActivitySpec, Dataflow, DataflowDocument, ExecutionEvent, Processor,
    Sink, Source, Value,
};
use loomruntime::{ActivityRegistry, LoomRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Loom dataflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a dataflow file
    Run {
        /// Path to dataflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input values as a JSON object keyed by input port
        #[arg(short, long)]
        input: Option<String>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a dataflow file and print the report
    Validate {
        /// Path to dataflow JSON file
        file: PathBuf,
    },

    /// List available activity types
    Activities,

    /// Create a new example dataflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "dataflow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn registry() -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    loomactivities::register_all(&mut registry);
    registry
}

fn load_dataflow(file: &PathBuf) -> Result<Dataflow> {
    let document = DataflowDocument::from_file(file)
        .with_context(|| format!("failed to read dataflow from {}", file.display()))?;
    Ok(document.build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            config,
            verbose,
        } => {
            init_logging(verbose);
            run_dataflow(file, input, config).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_dataflow(file)?;
        }

        Commands::Activities => {
            list_activities();
        }

        Commands::Init { output } => {
            create_example_dataflow(output)?;
        }
    }

    Ok(())
}

async fn run_dataflow(file: PathBuf, input: Option<String>, config: Option<PathBuf>) -> Result<()> {
    println!("🚀 Loading dataflow from: {}", file.display());

    let mut dataflow = load_dataflow(&file)?;
    dataflow.set_immutable();

    println!("📋 Dataflow: {}", dataflow.name());
    println!("   Processors: {}", dataflow.processors().len());
    println!("   Links: {}", dataflow.links().len());
    println!();

    let inputs: HashMap<String, Value> = match input {
        Some(input_str) => {
            let json: serde_json::Value = serde_json::from_str(&input_str).context("input is not valid JSON")?;
            let serde_json::Value::Object(obj) = json else {
                anyhow::bail!("Input must be a JSON object");
            };
            obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()
        }
        None => HashMap::new(),
    };

    let config = match config {
        Some(path) => RuntimeConfig::from_file(&path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    tracing::debug!(?config, "runtime configuration");
    let runtime = LoomRuntime::with_registry(Arc::new(registry()), config);

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { process, .. } => {
                    println!("▶️  Run {} started", process);
                }
                ExecutionEvent::ProcessorStarted { processor, jobs, .. } => {
                    println!("  ⚡ Starting processor: {} ({} job(s))", processor, jobs);
                }
                ExecutionEvent::ProcessorCompleted {
                    processor, jobs, errors, ..
                } => {
                    println!("  ✅ Processor {} finished {} job(s), {} error(s)", processor, jobs, errors);
                }
                ExecutionEvent::InvocationFailed {
                    processor, index, error, ..
                } => {
                    println!("  ❌ {}{} failed: {}", processor, index, error);
                }
                ExecutionEvent::ActivityEvent { processor, event, .. } => match event {
                    ActivityEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", processor, message);
                    }
                    ActivityEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", processor, message);
                    }
                    ActivityEvent::Progress { percent, message } => match message {
                        Some(msg) => println!("     📊 [{}] {}% - {}", processor, percent, msg),
                        None => println!("     📊 [{}] {}%", processor, percent),
                    },
                    ActivityEvent::Data { .. } => {}
                },
                ExecutionEvent::RunCompleted {
                    success, duration_ms, ..
                } => {
                    if success {
                        println!("✨ Run completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Run failed after {}ms", duration_ms);
                    }
                }
                _ => {}
            }
        }
    });

    let result = runtime.execute(&dataflow, inputs).await;

    // let the event printer catch up
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();
    let result = result?;

    println!();
    println!("📊 Execution Summary:");
    println!("   Run: {}", result.process);
    println!("   Duration: {}ms", result.duration_ms);

    if !result.outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (port, datum) in &result.outputs {
            let rendered = serde_json::to_string(&value_to_json(&datum.value))?;
            println!("   {} (depth {}): {}", port, datum.depth, rendered);
        }
    }

    Ok(())
}

fn validate_dataflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating dataflow: {}", file.display());

    let dataflow = load_dataflow(&file)?;
    let report = dataflow.check_validity();
    let registry = registry();

    let mut unknown = Vec::new();
    for processor in dataflow.processors() {
        for activity in processor.activities() {
            if activity.activity_type != ActivitySpec::NESTED_DATAFLOW && !registry.contains(&activity.activity_type)
            {
                unknown.push(format!("{} ({})", activity.activity_type, processor.name()));
            }
        }
    }

    print!("{}", report);
    if !unknown.is_empty() {
        println!("Unknown activity types: {}", unknown.join(", "));
    }

    if report.is_valid() && unknown.is_empty() {
        println!("✅ Dataflow '{}' is valid", dataflow.name());
        Ok(())
    } else {
        anyhow::bail!("dataflow '{}' is not valid", dataflow.name())
    }
}

fn list_activities() {
    println!("📦 Available Activity Types:");
    println!();

    let registry = registry();

    for activity_type in registry.list_activity_types() {
        if let Some(metadata) = registry.get_metadata(&activity_type) {
            println!("  • {} ({})", activity_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", activity_type);
        }
    }
    println!("  • {} (nested)", ActivitySpec::NESTED_DATAFLOW);
    println!("    Runs a nested dataflow once per job");
}

fn create_example_dataflow(output: PathBuf) -> Result<()> {
    let mut dataflow = Dataflow::new("tag_words");
    dataflow.edit(AddDataflowInput::new("text", 0))?;
    dataflow.edit(AddDataflowInput::new("tag", 0))?;
    dataflow.edit(AddDataflowOutput::new("tagged"))?;
    dataflow.edit(AddProcessor::new(
        Processor::new("split")
            .with_input("text", 0)
            .with_output("parts", 1)
            .with_activity(ActivitySpec::new("text.split").with_config("separator", " ")),
    ))?;
    dataflow.edit(AddProcessor::new(
        Processor::new("tag_each")
            .with_input("left", 0)
            .with_input("right", 0)
            .with_output("joined", 0)
            .with_activity(ActivitySpec::new("text.concat").with_config("separator", "#")),
    ))?;
    dataflow.edit(Connect::new(Source::dataflow_input("text"), Sink::processor("split", "text")))?;
    dataflow.edit(Connect::new(Source::processor("split", "parts"), Sink::processor("tag_each", "left")))?;
    dataflow.edit(Connect::new(Source::dataflow_input("tag"), Sink::processor("tag_each", "right")))?;
    dataflow.edit(Connect::new(Source::processor("tag_each", "joined"), Sink::dataflow_output("tagged")))?;

    let json = dataflow.to_document().to_json_pretty()?;
    std::fs::write(&output, json)?;

    println!("✨ Created example dataflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  loom run --file {} --input '{{\"text\": \"hello dataflow world\", \"tag\": \"loom\"}}'",
        output.display()
    );

    Ok(())
}
