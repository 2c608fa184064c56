//! Classbench - baseline vs. agentic image classification benchmark
//!
//! The `classbench` command prepares an anonymized evaluation corpus, runs
//! both classifiers over it and compares their accuracy.
//!
//! ## Commands
//!
//! - `prepare`: Sample labeled images into the anonymized corpus
//! - `baseline`: Run the direct classifier
//! - `agent`: Run the agentic classifier
//! - `evaluate`: Compare both runs and write the markdown report
//! - `datasets`: List the dataset catalog

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};

use classbench_core::{
    build_corpus, load_comparisons, render_console_comparison, write_report, AgentClassifier,
    BenchError, ClassifierAdapter, DirectClassifier, GroundTruthManifest, HarnessConfig,
    OutputProtocol, RunController, RunSummary,
};

#[derive(Parser)]
#[command(name = "classbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Benchmark a direct image classifier against a tool-using agent", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: ./classbench.toml when present)
    #[arg(short, long, global = true, env = "CLASSBENCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the anonymized evaluation corpus from the labeled source images
    Prepare {
        /// Images sampled per class
        #[arg(long)]
        per_class: Option<usize>,

        /// Sampling seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run the direct (single request) classifier
    Baseline {
        /// Classify only the first N items of each dataset
        #[arg(short, long)]
        limit: Option<usize>,

        /// Run a single dataset
        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// Run the agentic classifier
    Agent {
        /// Classify only the first N items of each dataset
        #[arg(short, long)]
        limit: Option<usize>,

        /// Run a single dataset
        #[arg(short, long)]
        dataset: Option<String>,

        /// Use the streaming output protocol and record the full agent trace
        #[arg(long)]
        stream: bool,
    },

    /// Compare baseline and agent runs, print the summary and write the report
    Evaluate,

    /// List the dataset catalog and whether each corpus is prepared
    Datasets,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    classbench_core::telemetry::init_tracing(cli.json, level);

    let config = HarnessConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let result = match cli.command {
        Commands::Prepare { per_class, seed } => cmd_prepare(config, per_class, seed),
        Commands::Baseline { limit, dataset } => cmd_baseline(&config, limit, dataset.as_deref()).await,
        Commands::Agent {
            limit,
            dataset,
            stream,
        } => cmd_agent(config, limit, dataset.as_deref(), stream).await,
        Commands::Evaluate => cmd_evaluate(&config),
        Commands::Datasets => cmd_datasets(&config),
    };

    if let Err(err) = &result {
        if let Some(BenchError::MissingArtifact { hint, .. }) = err.downcast_ref::<BenchError>() {
            eprintln!("hint: {hint}");
        }
    }
    result
}

/// Flag raised by Ctrl-C; the run stops after the item in flight.
fn install_stop_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current item");
            flag.store(true, Ordering::SeqCst);
        }
    });
    stop
}

/// Build the anonymized corpus
fn cmd_prepare(mut config: HarnessConfig, per_class: Option<usize>, seed: Option<u64>) -> Result<()> {
    if let Some(n) = per_class {
        config.sampling.per_class = n;
    }
    if let Some(s) = seed {
        config.sampling.seed = s;
    }

    let catalog = config.catalog();
    let metadata = build_corpus(&config, &catalog).context("Failed to prepare corpus")?;

    println!("Corpus: {}", config.corpus_root.display());
    println!("Seed: {}", metadata.seed);
    for (name, summary) in &metadata.datasets {
        println!(
            "  {}: {} images across {} classes",
            name, summary.num_images, summary.num_classes
        );
    }
    println!("Total: {} images", metadata.total_images);
    Ok(())
}

async fn run_variant(
    config: &HarnessConfig,
    adapter: &dyn ClassifierAdapter,
    limit: Option<usize>,
    dataset: Option<&str>,
) -> Result<Vec<RunSummary>> {
    let controller = RunController::new(config)
        .with_limit(limit)
        .with_stop_flag(install_stop_handler());
    let datasets = controller.select_datasets(dataset)?;
    info!(variant = %adapter.variant(), datasets = datasets.len(), "Running classifier");

    let summaries = controller.run_all(&datasets, adapter).await?;
    print_summaries(&summaries);
    Ok(summaries)
}

fn print_summaries(summaries: &[RunSummary]) {
    for s in summaries {
        let marker = if s.interrupted { " (interrupted)" } else { "" };
        println!(
            "{}: {}/{} = {:.1}%{}",
            s.dataset, s.correct, s.total, s.accuracy, marker
        );
        println!("  predictions: {}", s.predictions_path.display());
    }
}

/// Run the direct classifier over the corpus
async fn cmd_baseline(config: &HarnessConfig, limit: Option<usize>, dataset: Option<&str>) -> Result<()> {
    let adapter =
        DirectClassifier::new(config.direct.clone()).context("Failed to build direct classifier")?;
    run_variant(config, &adapter, limit, dataset)
        .await
        .context("Baseline run failed")?;
    Ok(())
}

/// Run the agentic classifier over the corpus
async fn cmd_agent(
    mut config: HarnessConfig,
    limit: Option<usize>,
    dataset: Option<&str>,
    stream: bool,
) -> Result<()> {
    if stream {
        config.agent.protocol = OutputProtocol::StreamJson;
    }
    let adapter = AgentClassifier::new(config.agent.clone());
    run_variant(&config, &adapter, limit, dataset)
        .await
        .context("Agent run failed")?;
    Ok(())
}

/// Aggregate both runs and write the report
fn cmd_evaluate(config: &HarnessConfig) -> Result<()> {
    let controller = RunController::new(config);
    let comparisons = load_comparisons(&config.corpus_root, controller.layout())
        .context("Failed to load run results")?;

    print!("{}", render_console_comparison(&comparisons));

    let report_path = controller.layout().report_path();
    write_report(&report_path, &comparisons, Utc::now())
        .with_context(|| format!("write {:?}", report_path))?;
    println!("Report: {}", report_path.display());
    Ok(())
}

/// List configured datasets
fn cmd_datasets(config: &HarnessConfig) -> Result<()> {
    let catalog = config.catalog();
    for name in catalog.sorted_names() {
        let Some(spec) = catalog.get(name) else {
            continue;
        };
        let dataset_dir = config.corpus_root.join(name);
        let status = match GroundTruthManifest::load(&dataset_dir) {
            Ok(manifest) => format!("prepared, {} items", manifest.items.len()),
            Err(BenchError::MissingArtifact { .. }) => "not prepared".to_string(),
            Err(e) => format!("unreadable: {e}"),
        };
        println!("{} - {} ({})", spec.name, spec.description, status);
        println!("  classes: {}", spec.classes.join(", "));
    }
    Ok(())
}
