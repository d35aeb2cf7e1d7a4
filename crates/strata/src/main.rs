mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use strata_cloud_local::DEFAULT_REGION;
use strata_core::{FailurePolicy, RollbackPolicy};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Declare it once. Strata works out the order.", long_about = None)]
struct Cli {
    /// Stack file (default: discovered from the current directory)
    #[arg(short, long, global = true, env = "STRATA_STACK_PATH")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the stack file and show the dependency order
    Validate,
    /// Show what `up` would change
    Plan,
    /// Create or update every declared resource
    Up(RunArgs),
    /// Delete every recorded resource
    Down(RunArgs),
    /// Show the stack outputs from recorded state
    Outputs {
        /// Print the available outputs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Maximum provider calls in flight (overrides the stack settings)
    #[arg(short = 'c', long, env = "STRATA_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// continue | stop
    #[arg(long, value_name = "POLICY", value_parser = parse_failure_policy)]
    pub on_failure: Option<FailurePolicy>,

    /// incremental | transactional
    #[arg(long, value_name = "POLICY", value_parser = parse_rollback_policy)]
    pub rollback: Option<RollbackPolicy>,

    /// Region the local provider simulates
    #[arg(long, env = "STRATA_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

fn parse_failure_policy(value: &str) -> Result<FailurePolicy, String> {
    value.parse().map_err(|e: strata_core::FlowError| e.to_string())
}

fn parse_rollback_policy(value: &str) -> Result<RollbackPolicy, String> {
    value.parse().map_err(|e: strata_core::FlowError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("strata {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let stack_file = utils::resolve_stack_file(cli.file)?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&stack_file)?,
        Commands::Plan => commands::plan::handle(&stack_file).await?,
        Commands::Up(args) => commands::up::handle(&stack_file, &args).await?,
        Commands::Down(args) => commands::down::handle(&stack_file, &args).await?,
        Commands::Outputs { json } => commands::outputs::handle(&stack_file, json).await?,
        Commands::Version => unreachable!("Version is handled before stack discovery"),
    }

    Ok(())
}
