mod commands;
mod report;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use termdrill_common::{Config, EngineMode};

#[derive(Parser)]
#[command(name = "termdrill")]
#[command(about = "termdrill - sandboxed, graded command-line exercises", long_about = None)]
struct Cli {
    /// Engine mode: auto, docker, podman or mock (overrides TERMDRILL_ENGINE)
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Force a specific engine binary (overrides TERMDRILL_FORCE_ENGINE)
    #[arg(long, global = true)]
    force: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the container engine that would be used
    Detect,

    /// Start a level sandbox from a start request file
    Start {
        /// JSON start request
        #[arg(short, long)]
        spec: PathBuf,

        /// Attach an interactive shell, then stop the sandbox on exit
        #[arg(long)]
        attach: bool,
    },

    /// Remove sandboxes left behind by other sessions
    Cleanup {
        /// Session whose sandboxes are kept
        #[arg(short, long)]
        active_session: Option<String>,
    },

    /// Grade an attempt from a grading request file
    Grade {
        /// JSON grading request
        #[arg(short, long)]
        request: PathBuf,

        /// Use the deterministic mock grader
        #[arg(long)]
        mock: bool,

        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Also write diff artifacts under this directory
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },
}

fn init_tracing() {
    // stderr keeps stdout machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(mode) = &cli.engine {
        config.engine_mode =
            EngineMode::parse(mode).ok_or_else(|| anyhow!("Unknown engine mode '{}'", mode))?;
    }
    if cli.force.is_some() {
        config.force_engine = cli.force;
    }

    match cli.command {
        Commands::Detect => {
            commands::detect(&config).await?;
        }
        Commands::Start { spec, attach } => {
            commands::start(&config, &spec, attach).await?;
        }
        Commands::Cleanup { active_session } => {
            commands::cleanup(&config, active_session.as_deref()).await?;
        }
        Commands::Grade {
            request,
            mock,
            format,
            artifacts_dir,
        } => {
            if artifacts_dir.is_some() {
                config.artifacts_dir = artifacts_dir;
            }
            commands::grade(&config, &request, mock, format).await?;
        }
    }

    Ok(())
}
