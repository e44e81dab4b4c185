//! Task records, parameters and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Status ───────────────────────────────────────────────────────────

/// Lifecycle state of a task.
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`. A pending task may
/// also go straight to `Failed` (gate contention) or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ── Kind & parameters ────────────────────────────────────────────────

/// Which heavyweight computation a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Analysis,
    NewsEvaluation,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis => f.write_str("analysis"),
            Self::NewsEvaluation => f.write_str("news_evaluation"),
        }
    }
}

/// Inputs captured when a task is created, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskParams {
    Analysis(AnalysisParams),
    NewsEvaluation(NewsParams),
}

impl TaskParams {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Analysis(_) => TaskKind::Analysis,
            Self::NewsEvaluation(_) => TaskKind::NewsEvaluation,
        }
    }

    /// Number of symbols the computation works through.
    pub fn top_n(&self) -> u32 {
        match self {
            Self::Analysis(p) => p.top_n,
            Self::NewsEvaluation(p) => p.top_n,
        }
    }
}

/// Market-data analysis over the top symbols by turnover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    #[serde(default = "default_analysis_top_n")]
    pub top_n: u32,
    /// Factor IDs to compute. `None` computes every factor.
    #[serde(default)]
    pub selected_factors: Option<Vec<String>>,
    /// Fetch fresh candles before computing instead of reusing stored data.
    #[serde(default = "default_true")]
    pub collect_latest_data: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            top_n: default_analysis_top_n(),
            selected_factors: None,
            collect_latest_data: true,
        }
    }
}

/// LLM-backed news evaluation for the top symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsParams {
    #[serde(default = "default_news_top_n")]
    pub top_n: u32,
    #[serde(default = "default_news_per_symbol")]
    pub news_per_symbol: u32,
    #[serde(default = "default_news_model")]
    pub model: String,
}

impl Default for NewsParams {
    fn default() -> Self {
        Self {
            top_n: default_news_top_n(),
            news_per_symbol: default_news_per_symbol(),
            model: default_news_model(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_analysis_top_n() -> u32 {
    50
}

fn default_news_top_n() -> u32 {
    10
}

fn default_news_per_symbol() -> u32 {
    3
}

fn default_news_model() -> String {
    "gpt-oss-120b".to_string()
}

// ── Task record ──────────────────────────────────────────────────────

/// One tracked unit of background work.
///
/// Values handed out by the registry are snapshots; the canonical record is
/// only mutated through [`TaskRegistry`](crate::TaskRegistry) operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Fraction done, always within `[0.0, 1.0]`.
    pub progress: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub params: TaskParams,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Bumped on every observable mutation.
    pub version: u64,
}

impl Task {
    /// A fresh `Pending` task at version 0.
    pub fn pending(id: Uuid, params: TaskParams, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: params.kind(),
            status: TaskStatus::Pending,
            progress: 0.0,
            message: message.into(),
            created_at: Utc::now(),
            completed_at: None,
            params,
            result: None,
            error: None,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
