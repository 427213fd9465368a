use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adapt_kernel::config::AdaptationConfig;
use adapt_kernel::feedback::FeedbackItem;
use adapt_kernel::policy::should_trigger;
use adapt_kernel::runner::SimulatedRunner;
use adapt_kernel::{AdaptationOrchestrator, TriggerOutcome};

/// Feedback-driven adaptation CLI
#[derive(Parser, Debug)]
#[command(name = "adapt")]
#[command(about = "Feedback-driven adapter retraining (simulated runner)", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to adaptation config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON Lines feedback file through the orchestrator
    Replay {
        /// One feedback object per line: prompt, original_completion, corrected_completion
        #[arg(long)]
        feedback: PathBuf,

        /// Simulated training time per cycle
        #[arg(long, default_value = "50")]
        train_delay_ms: u64,

        /// Make every simulated training run fail
        #[arg(long)]
        fail: bool,
    },

    /// Show whether a pool of the given size would trigger retraining
    Check {
        #[arg(long)]
        pool_size: usize,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    pool_size: usize,
    feedback_threshold: usize,
    triggers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => AdaptationConfig::from_path(path)?,
        None => AdaptationConfig::default(),
    };

    match cli.command {
        Commands::Replay {
            feedback,
            train_delay_ms,
            fail,
        } => replay(config, &feedback, Duration::from_millis(train_delay_ms), fail).await?,
        Commands::Check { pool_size } => {
            let threshold = config.policy.feedback_threshold;
            let output = CheckOutput {
                pool_size,
                feedback_threshold: threshold,
                triggers: should_trigger(pool_size, threshold),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

async fn replay(config: AdaptationConfig, feedback: &Path, delay: Duration, fail: bool) -> Result<()> {
    let runner = if fail {
        SimulatedRunner::failing(delay)
    } else {
        SimulatedRunner::new(delay)
    };

    let orchestrator = AdaptationOrchestrator::builder(Arc::new(runner))
        .config(config)
        .build()?;
    orchestrator.load_base_model().await?;

    let data = fs::read_to_string(feedback)
        .with_context(|| format!("cannot read feedback file {}", feedback.display()))?;

    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: FeedbackItem = serde_json::from_str(line)
            .with_context(|| format!("line {}: malformed feedback", line_no + 1))?;

        match orchestrator.submit(item) {
            Ok(receipt) => {
                info!(line = line_no + 1, "{}", receipt.message());
                if let TriggerOutcome::Started(cycle) = receipt.outcome {
                    // Cycles run in the background; wait so the replay is deterministic.
                    let report = cycle.wait().await?;
                    info!(cycle = %report.cycle_id, outcome = ?report.outcome, "cycle finished");
                }
            }
            Err(err) => tracing::warn!(line = line_no + 1, error = %err, "feedback rejected"),
        }
    }

    orchestrator.wait_idle().await;
    let snapshot = orchestrator.status().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
