//! Collaborator seams used by the scheduled jobs.
//!
//! The scheduler never talks to an exchange, a strategy engine or a report
//! generator directly; it calls these traits. [`crate::paper`] ships
//! in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use daybreak_tasks::Task;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An open position held by the trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub pair: String,
    pub amount: f64,
    pub open_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub pair: String,
    pub side: Side,
    pub stake_amount: f64,
    #[serde(default)]
    pub reason: String,
}

/// Signals generated from one analysis result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBatch {
    pub buy: Vec<Signal>,
    pub sell: Vec<Signal>,
}

impl SignalBatch {
    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len()
    }

    /// Execution order: sells first to free up stake, then buys.
    pub fn ordered(self) -> Vec<Signal> {
        let mut all = self.sell;
        all.extend(self.buy);
        all
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub success: bool,
    pub executed: usize,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait SignalDesk: Send + Sync {
    async fn list_open_positions(&self) -> anyhow::Result<Vec<Position>>;

    /// Turn a completed analysis task into buy/sell signals for the
    /// `top_n` best-ranked pairs, given the pairs currently held.
    async fn generate_signals(
        &self,
        analysis: &Task,
        top_n: u32,
        held: &[String],
    ) -> anyhow::Result<SignalBatch>;

    async fn execute_signals(&self, signals: Vec<Signal>) -> anyhow::Result<ExecutionSummary>;
}

#[async_trait]
pub trait PatternStrategy: Send + Sync {
    async fn run(&self, task_id: Uuid) -> anyhow::Result<serde_json::Value>;
}

#[async_trait]
pub trait TimeframeReviewer: Send + Sync {
    async fn review(&self) -> anyhow::Result<serde_json::Value>;
}

/// One-shot action run shortly after the scheduler starts.
#[async_trait]
pub trait StartupHook: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// Everything the scheduled jobs call out to.
#[derive(Clone)]
pub struct JobCollaborators {
    pub signal_desk: Arc<dyn SignalDesk>,
    pub pattern_strategy: Arc<dyn PatternStrategy>,
    pub reviewer: Arc<dyn TimeframeReviewer>,
    pub startup_hook: Option<Arc<dyn StartupHook>>,
}

impl std::fmt::Debug for JobCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCollaborators")
            .field("startup_hook", &self.startup_hook.is_some())
            .finish_non_exhaustive()
    }
}
