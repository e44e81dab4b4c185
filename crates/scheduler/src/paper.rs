//! In-memory paper-trading collaborators.
//!
//! Used by the worker binary when no exchange is configured, and by tests.
//! Nothing here touches the network.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use daybreak_tasks::Task;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::collaborators::{
    ExecutionSummary, PatternStrategy, Position, Side, Signal, SignalBatch, SignalDesk,
    StartupHook, TimeframeReviewer,
};

/// Paper account that buys the top-ranked pairs from an analysis result and
/// sells held pairs that dropped out of the ranking.
#[derive(Debug)]
pub struct PaperDesk {
    stake_amount: f64,
    positions: Mutex<Vec<Position>>,
    executed: Mutex<Vec<Signal>>,
}

impl PaperDesk {
    pub fn new(stake_amount: f64) -> Self {
        Self {
            stake_amount,
            positions: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_positions(self, positions: Vec<Position>) -> Self {
        *self.positions.lock().unwrap_or_else(PoisonError::into_inner) = positions;
        self
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every signal executed so far, in execution order.
    pub fn executed(&self) -> Vec<Signal> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Pairs listed under `result.ranking` of an analysis task, best first.
fn ranked_pairs(analysis: &Task, top_n: u32) -> Vec<String> {
    analysis
        .result
        .as_ref()
        .and_then(|r| r.get("ranking"))
        .and_then(|r| r.as_array())
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .take(top_n as usize)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SignalDesk for PaperDesk {
    async fn list_open_positions(&self) -> anyhow::Result<Vec<Position>> {
        Ok(self.positions())
    }

    async fn generate_signals(
        &self,
        analysis: &Task,
        top_n: u32,
        held: &[String],
    ) -> anyhow::Result<SignalBatch> {
        let ranked = ranked_pairs(analysis, top_n);

        let buy = ranked
            .iter()
            .filter(|pair| !held.contains(*pair))
            .map(|pair| Signal {
                pair: pair.clone(),
                side: Side::Buy,
                stake_amount: self.stake_amount,
                reason: format!("ranked in top {} by analysis {}", top_n, analysis.id),
            })
            .collect();
        let sell = held
            .iter()
            .filter(|pair| !ranked.contains(*pair))
            .map(|pair| Signal {
                pair: pair.clone(),
                side: Side::Sell,
                stake_amount: 0.0,
                reason: format!("dropped out of top {}", top_n),
            })
            .collect();

        Ok(SignalBatch { buy, sell })
    }

    async fn execute_signals(&self, signals: Vec<Signal>) -> anyhow::Result<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();
        let mut positions = self.positions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);

        for signal in signals {
            let held_at = positions.iter().position(|p| p.pair == signal.pair);
            match (signal.side, held_at) {
                (Side::Sell, Some(idx)) => {
                    positions.remove(idx);
                }
                (Side::Sell, None) => {
                    summary.errors.push(format!("no open position for {}", signal.pair));
                    continue;
                }
                (Side::Buy, Some(_)) => {
                    summary.errors.push(format!("{} is already held", signal.pair));
                    continue;
                }
                (Side::Buy, None) => positions.push(Position {
                    pair: signal.pair.clone(),
                    amount: signal.stake_amount,
                    open_rate: 1.0,
                }),
            }
            info!(pair = %signal.pair, side = ?signal.side, "paper order filled");
            summary.executed += 1;
            executed.push(signal);
        }

        summary.success = summary.errors.is_empty();
        Ok(summary)
    }
}

/// Pattern strategy that only reports that it ran.
#[derive(Debug, Default)]
pub struct PaperPatternStrategy;

#[async_trait]
impl PatternStrategy for PaperPatternStrategy {
    async fn run(&self, task_id: Uuid) -> anyhow::Result<serde_json::Value> {
        Ok(json!({
            "task_id": task_id,
            "checked_at": Utc::now(),
            "signals": [],
        }))
    }
}

/// Reviewer producing a fixed multi-timeframe skeleton report.
#[derive(Debug, Default)]
pub struct PaperReviewer;

#[async_trait]
impl TimeframeReviewer for PaperReviewer {
    async fn review(&self) -> anyhow::Result<serde_json::Value> {
        Ok(json!({
            "generated_at": Utc::now(),
            "timeframes": ["15m", "1h", "4h", "1d"],
            "pairs": [],
        }))
    }
}

#[derive(Debug, Default)]
pub struct LoggingStartupHook;

#[async_trait]
impl StartupHook for LoggingStartupHook {
    async fn run(&self) -> anyhow::Result<()> {
        info!("startup hook fired");
        Ok(())
    }
}
