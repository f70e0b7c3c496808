use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ransom_ledger::{
    pipeline, ExplorerClient, FetchSnapshot, PipelineConfig, PipelineError, RunMode, RunRequest,
    SnapshotSource, SummarySource,
};

#[derive(Parser)]
#[command(name = "ransom-ledger")]
#[command(version)]
#[command(about = "Aggregate ransomware address inflows from incident sheets", long_about = None)]
struct Cli {
    /// TOML config file (rates, workers, endpoint, ...)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Directory of exported sheets (*.csv)
    #[arg(short, long, default_value = "uploads")]
    input: PathBuf,

    /// Family mapping JSON (raw suffix → family)
    #[arg(short, long, default_value = "uploads/family.json")]
    mapping: PathBuf,

    /// Directory for report files
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Concurrent explorer requests (overrides config)
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch summaries from the explorer and build reports
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Save fetched summaries for later replay
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Explorer API key (overrides OKLINK_API_KEY)
        #[arg(long, env = "OKLINK_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Rebuild reports from a saved snapshot, without network access
    Replay {
        #[command(flatten)]
        common: CommonArgs,

        /// Snapshot written by `run --snapshot`
        #[arg(long)]
        snapshot: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli) {
        Ok(partial) => {
            if partial {
                warn!("run completed with partial data; see diagnostics.csv");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Returns whether the run produced partial data
fn execute(cli: Cli) -> Result<bool, PipelineError> {
    let mut config =
        PipelineConfig::load(cli.config.as_deref()).map_err(PipelineError::Configuration)?;

    match cli.command {
        Commands::Run {
            common,
            snapshot,
            api_key,
        } => {
            if let Some(key) = api_key {
                config.api_key = Some(key);
            }
            apply_overrides(&mut config, &common);

            let client = build_client(&config).map_err(PipelineError::Configuration)?;
            let request = build_request(&common, RunMode::Live, snapshot, &config.endpoint);
            run_with(&request, &client, &config)
        }
        Commands::Replay { common, snapshot } => {
            apply_overrides(&mut config, &common);

            let recorded = FetchSnapshot::load(&snapshot).map_err(PipelineError::Configuration)?;
            info!(
                pairs = recorded.outcomes.len(),
                recorded_at = %recorded.recorded_at,
                "replaying snapshot"
            );
            let request = build_request(&common, RunMode::Replay, None, &recorded.endpoint);
            run_with(&request, &SnapshotSource::new(recorded), &config)
        }
    }
}

fn apply_overrides(config: &mut PipelineConfig, common: &CommonArgs) {
    if let Some(workers) = common.workers {
        config.workers = workers.max(1);
    }
}

fn build_client(config: &PipelineConfig) -> Result<ExplorerClient> {
    let api_key = config.require_api_key()?;
    ExplorerClient::new(&config.endpoint, api_key, config.request_timeout())
}

fn build_request(
    common: &CommonArgs,
    mode: RunMode,
    snapshot_out: Option<PathBuf>,
    endpoint: &str,
) -> RunRequest {
    RunRequest {
        input_dir: common.input.clone(),
        mapping_path: common.mapping.clone(),
        output_dir: common.output.clone(),
        mode,
        snapshot_out,
        endpoint: endpoint.to_string(),
    }
}

fn run_with(
    request: &RunRequest,
    source: &dyn SummarySource,
    config: &PipelineConfig,
) -> Result<bool, PipelineError> {
    let run = pipeline::run(request, source, config)?;

    println!("📊 {}", run.reports.summary());
    for path in &run.written {
        println!("✓ {}", path.display());
    }
    if run.is_partial() {
        println!(
            "⚠️  {} of {} pairs could not be enriched",
            run.manifest.failed_pairs, run.manifest.unique_pairs
        );
    }

    Ok(run.is_partial())
}
