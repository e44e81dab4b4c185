//! daybreak-worker: runs the daily trading schedule.
//!
//! Wires a task runner with synthetic computations and the paper-trading
//! collaborators, starts the scheduler, and logs every scheduler status
//! change until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_stream::StreamExt;
use tracing::info;

use daybreak_core::{load_dotenv, Config};
use daybreak_scheduler::paper::{LoggingStartupHook, PaperDesk, PaperPatternStrategy, PaperReviewer};
use daybreak_scheduler::{JobCollaborators, Scheduler};
use daybreak_tasks::{Computations, SyntheticComputation, TaskKind, TaskRunner};

// ── CLI ─────────────────────────────────────────────────────────────

/// Daily analysis, news evaluation and trading scheduler.
#[derive(Parser, Debug)]
#[command(name = "daybreak-worker", version, about)]
struct Cli {
    /// Fire one daily sequence right after startup.
    #[arg(long, env = "DAYBREAK_RUN_NOW")]
    run_now: bool,

    /// Start with job execution disabled.
    #[arg(long)]
    disabled: bool,

    /// Do not log scheduler status changes.
    #[arg(long)]
    quiet_status: bool,

    /// Steps per synthetic computation.
    #[arg(long, env = "DAYBREAK_SYNTHETIC_STEPS", default_value_t = 10)]
    synthetic_steps: u32,

    /// Delay per synthetic step in milliseconds.
    #[arg(long, env = "DAYBREAK_SYNTHETIC_STEP_MS", default_value_t = 500)]
    synthetic_step_ms: u64,

    /// Stake per paper buy order.
    #[arg(long, env = "DAYBREAK_PAPER_STAKE", default_value_t = 100.0)]
    paper_stake: f64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if cli.disabled {
        config.scheduler.enabled = false;
    }
    config.log_summary();

    let step = Duration::from_millis(cli.synthetic_step_ms);
    let computations = Computations::new()
        .with(
            TaskKind::Analysis,
            Arc::new(SyntheticComputation::new("analysis", cli.synthetic_steps, step)),
        )
        .with(
            TaskKind::NewsEvaluation,
            Arc::new(SyntheticComputation::new("news_evaluation", cli.synthetic_steps, step)),
        );
    let runner = TaskRunner::new(&config.tasks, computations);

    let collaborators = JobCollaborators {
        signal_desk: Arc::new(PaperDesk::new(cli.paper_stake)),
        pattern_strategy: Arc::new(PaperPatternStrategy),
        reviewer: Arc::new(PaperReviewer),
        startup_hook: Some(Arc::new(LoggingStartupHook)),
    };

    let scheduler = Scheduler::new(config.scheduler.clone(), runner.clone(), collaborators);
    scheduler.start()?;

    if cli.run_now {
        let at = scheduler.run_now();
        info!(at = %at, "manual daily run requested");
    }

    let status_logger = (!cli.quiet_status).then(|| {
        let mut stream = scheduler.stream_status();
        tokio::spawn(async move {
            while let Some(status) = stream.next().await {
                info!(status = %status, "scheduler status");
            }
        })
    });

    info!("daybreak-worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    scheduler.shutdown().await;
    let stopped = runner.cancel_all();
    if stopped > 0 {
        info!(stopped, "stop requested for running tasks");
    }
    if let Some(handle) = status_logger {
        handle.abort();
    }

    info!("daybreak-worker exited cleanly");
    Ok(())
}
