use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_core::app::{
    AppContext, CycleOutcome, CycleReport, PollLoop, PollOrchestrator, StatusSnapshot, ViewOutcome,
    ViewerAggregator,
};
use vigil_core::config::{ConfigFile, TomlSettingsFile};
use vigil_core::impls::{JsonFileStore, LogNotifier, RpcClient};
use vigil_core::ports::{SettingsSource, SystemClock, UlidGenerator};

#[derive(Parser)]
#[command(name = "vigil", version, about = "Watch followed accounts for new activity")]
struct Cli {
    /// TOML config file
    #[arg(long, env = "VIGIL_CONFIG", default_value = "vigil.toml")]
    config: PathBuf,

    /// JSON state file shared by the poller and the viewer
    #[arg(long, env = "VIGIL_STATE", default_value = "vigil-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll on the configured interval until Ctrl-C
    Serve,
    /// Run a single poll cycle
    PollOnce {
        #[arg(long)]
        json: bool,
    },
    /// Open the feed of pending activity
    View {
        #[arg(long)]
        json: bool,
    },
    /// Show lock, checkpoint and ledger state
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct CycleSummary {
    cycle: String,
    outcome: String,
    scanned: usize,
    changed: usize,
    skipped: usize,
}

impl From<&CycleReport> for CycleSummary {
    fn from(report: &CycleReport) -> Self {
        let outcome = match &report.outcome {
            CycleOutcome::Completed => "completed".to_string(),
            CycleOutcome::Suspended { index } => format!("suspended at {index}"),
            CycleOutcome::LockBusy => "lock busy".to_string(),
            CycleOutcome::LockLost => "lock lost".to_string(),
            CycleOutcome::Aborted(reason) => format!("aborted: {reason}"),
        };
        Self {
            cycle: report.cycle.to_string(),
            outcome,
            scanned: report.scanned,
            changed: report.changed,
            skipped: report.skipped,
        }
    }
}

async fn build_context(cli: &Cli) -> Result<AppContext> {
    let file = ConfigFile::load(&cli.config).await?;
    file.tuning.validate()?;
    let settings_source = Arc::new(TomlSettingsFile::new(&cli.config));
    let settings = settings_source
        .load()
        .await
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;

    // The endpoint is bound for the life of the process.
    let remote = RpcClient::new(settings.api_endpoint.clone())?
        .rate_limit_code(file.tuning.rate_limit_code);
    info!(endpoint = remote.endpoint(), observer = %settings.observer, "starting");

    Ok(AppContext {
        store: Arc::new(JsonFileStore::new(&cli.state)),
        remote: Arc::new(remote),
        notifier: Arc::new(LogNotifier::new()),
        clock: Arc::new(SystemClock),
        ids: Arc::new(UlidGenerator::new(SystemClock)),
        settings: settings_source,
        tuning: file.tuning,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=info,vigil_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli).await?;

    match cli.command {
        Command::Serve => {
            let poller = Arc::new(PollOrchestrator::new(ctx.clone()));
            let handle = PollLoop::spawn(poller, ctx.settings.clone());
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            info!("shutting down");
            handle.shutdown_and_join().await;
        }
        Command::PollOnce { json } => {
            let report = PollOrchestrator::new(ctx).run_cycle().await?;
            let summary = CycleSummary::from(&report);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "cycle {}: {} (scanned {}, changed {}, skipped {})",
                    summary.cycle, summary.outcome, summary.scanned, summary.changed, summary.skipped
                );
            }
        }
        Command::View { json } => match ViewerAggregator::new(ctx).open().await? {
            ViewOutcome::Busy => println!("Another view is open; try again shortly."),
            ViewOutcome::Rendered(view) if json => {
                println!("{}", serde_json::to_string_pretty(&view)?)
            }
            ViewOutcome::Rendered(view) => print!("{view}"),
        },
        Command::Status { json } => {
            let status = StatusSnapshot::collect(&ctx).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{status}");
            }
        }
    }
    Ok(())
}
