//! The daily three-phase sequence: analysis, news evaluation, trading.
//!
//! Phases run strictly in order on the job's own tokio task. A phase that
//! ends badly (failed, cancelled, vanished, or could not be created) aborts
//! the rest of the sequence. A phase that is still running when the wait
//! bound expires only logs a warning and the sequence moves on. Whatever
//! happens, the analysis and news slots are cleared at the end.

use anyhow::Context;
use chrono::Utc;
use daybreak_tasks::{AnalysisParams, NewsParams, Task, TaskKind, TaskParams, TaskStatus};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::ExecutionSummary;
use crate::core::{write_lock, Scheduler};
use crate::job::JobKind;

/// How waiting on a phase's task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Finished(Task),
    /// The task is no longer in the registry.
    Missing,
    /// Still running when the wait bound expired.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyPhase {
    Analysis,
    NewsEvaluation,
    Trading,
}

/// Result of one invocation of the daily sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum DailyRunOutcome {
    /// The scheduler was disabled; nothing ran.
    Skipped,
    /// A task phase ended badly and later phases were not attempted.
    Aborted { phase: DailyPhase, reason: String },
    /// The trading phase itself failed. Logged only.
    TradingFailed { reason: String },
    /// All phases ran. `execution` is `None` when there was no analysis
    /// result to trade on.
    Completed { execution: Option<ExecutionSummary> },
}

impl Scheduler {
    /// Run the daily sequence once.
    pub async fn run_daily_sequence(&self) -> DailyRunOutcome {
        if !self.is_enabled() {
            info!("scheduler disabled, skipping daily sequence");
            return DailyRunOutcome::Skipped;
        }
        *write_lock(&self.last_run) = Some(Utc::now());
        info!("daily sequence starting");

        let _slots = self.slot_guard(&[JobKind::Analysis, JobKind::NewsEvaluation]);
        self.daily_phases().await
    }

    async fn daily_phases(&self) -> DailyRunOutcome {
        let analysis = TaskParams::Analysis(AnalysisParams {
            top_n: self.config.analysis_top_n,
            selected_factors: None,
            collect_latest_data: true,
        });
        let analysis = match self.run_phase(DailyPhase::Analysis, JobKind::Analysis, analysis).await {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                error!(phase = "analysis", reason = %reason, "daily sequence aborted");
                return DailyRunOutcome::Aborted {
                    phase: DailyPhase::Analysis,
                    reason,
                };
            }
        };

        let news = TaskParams::NewsEvaluation(NewsParams {
            top_n: self.config.news_top_n,
            news_per_symbol: self.config.news_per_symbol,
            model: self.config.news_model.clone(),
        });
        if let Err(reason) = self
            .run_phase(DailyPhase::NewsEvaluation, JobKind::NewsEvaluation, news)
            .await
        {
            error!(phase = "news_evaluation", reason = %reason, "daily sequence aborted");
            return DailyRunOutcome::Aborted {
                phase: DailyPhase::NewsEvaluation,
                reason,
            };
        }

        match self.run_trading_phase(analysis).await {
            Ok(execution) => DailyRunOutcome::Completed { execution },
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(phase = "trading", error = %reason, "trading phase failed");
                DailyRunOutcome::TradingFailed { reason }
            }
        }
    }

    /// Create a task for one phase, publish it in the slot and wait for it.
    ///
    /// `Ok(Some(task))` when it completed, `Ok(None)` on a soft timeout and
    /// `Err(reason)` when the sequence must stop.
    async fn run_phase(
        &self,
        phase: DailyPhase,
        kind: JobKind,
        params: TaskParams,
    ) -> Result<Option<Task>, String> {
        let id = self
            .runner
            .create_task(params)
            .map_err(|e| format!("could not create {} task: {}", kind, e))?;
        self.set_slot(kind, id);
        info!(phase = ?phase, task_id = %id, "phase task created");

        match self.wait_for_task(id).await {
            PhaseOutcome::Finished(task) if task.status == TaskStatus::Completed => {
                info!(phase = ?phase, task_id = %id, "phase completed");
                Ok(Some(task))
            }
            PhaseOutcome::Finished(task) => Err(format!(
                "{} task {} ended {}: {}",
                kind,
                id,
                task.status,
                task.error.unwrap_or(task.message)
            )),
            PhaseOutcome::Missing => Err(format!("{} task {} disappeared", kind, id)),
            PhaseOutcome::TimedOut => {
                warn!(
                    phase = ?phase,
                    task_id = %id,
                    max_wait_secs = self.config.phase_max_wait_secs,
                    "phase still running after max wait, continuing"
                );
                Ok(None)
            }
        }
    }

    /// Poll a task until it is terminal, gone, or the phase wait bound expires.
    pub async fn wait_for_task(&self, id: Uuid) -> PhaseOutcome {
        let deadline = Instant::now() + self.config.phase_max_wait();
        let poll = self.config.phase_poll_interval();

        loop {
            match self.runner.get_task(id) {
                Ok(task) if task.is_terminal() => return PhaseOutcome::Finished(task),
                Ok(_) => {}
                Err(_) => return PhaseOutcome::Missing,
            }
            let now = Instant::now();
            if now >= deadline {
                return PhaseOutcome::TimedOut;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Phase 3: held positions plus the analysis ranking become signals,
    /// executed sells first.
    async fn run_trading_phase(
        &self,
        analysis: Option<Task>,
    ) -> anyhow::Result<Option<ExecutionSummary>> {
        let analysis = analysis.or_else(|| {
            self.runner
                .last_completed()
                .filter(|t| t.kind == TaskKind::Analysis)
        });
        let Some(analysis) = analysis else {
            warn!("no completed analysis to trade on, skipping signal execution");
            return Ok(None);
        };

        let desk = &self.collaborators.signal_desk;
        let positions = desk
            .list_open_positions()
            .await
            .context("listing open positions")?;
        let held: Vec<String> = positions.into_iter().map(|p| p.pair).collect();

        let batch = desk
            .generate_signals(&analysis, self.config.signal_top_n, &held)
            .await
            .with_context(|| format!("generating signals from analysis {}", analysis.id))?;
        if batch.is_empty() {
            info!(analysis = %analysis.id, "no trade signals generated");
            return Ok(Some(ExecutionSummary {
                success: true,
                ..ExecutionSummary::default()
            }));
        }

        info!(
            buys = batch.buy.len(),
            sells = batch.sell.len(),
            held = held.len(),
            "executing trade signals"
        );
        let summary = desk
            .execute_signals(batch.ordered())
            .await
            .context("executing signals")?;
        if summary.success {
            info!(executed = summary.executed, "trade signals executed");
        } else {
            warn!(
                executed = summary.executed,
                errors = ?summary.errors,
                "trade signals executed with errors"
            );
        }
        Ok(Some(summary))
    }
}
