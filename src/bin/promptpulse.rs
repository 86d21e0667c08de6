//! PromptPulse CLI binary
//!
//! One binary, one subcommand per pipeline process. Each process loads the
//! same TOML configuration and runs until SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use promptpulse_core::config::PipelineConfig;
use promptpulse_core::{runtime, telemetry};

#[derive(Parser)]
#[command(name = "promptpulse", about = "LLM evaluation pipeline workers", version)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(
        short,
        long,
        default_value = "promptpulse.toml",
        env = "PROMPTPULSE_CONFIG"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the submission API
    Gateway,
    /// Consume the inference topic and call target models
    InferenceWorker,
    /// Consume the judge topic, score responses, archive results
    JudgeWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_file(&cli.config)?;

    match cli.command {
        Command::Gateway => runtime::run_gateway(config).await?,
        Command::InferenceWorker => runtime::run_inference_worker(config).await?,
        Command::JudgeWorker => runtime::run_judge_worker(config).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
