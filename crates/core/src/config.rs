use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub tasks: TaskConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DAYBREAK_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DAYBREAK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            tasks: TaskConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  tasks:      gate_timeout={}s, stream_poll={}ms",
            self.tasks.gate_acquire_timeout_secs,
            self.tasks.task_stream_poll_ms
        );
        tracing::info!(
            "  scheduler:  enabled={}, daily='{}', review='{}', strategy_every={}s",
            self.scheduler.enabled,
            self.scheduler.daily_cron,
            self.scheduler.review_cron,
            self.scheduler.strategy_interval_secs
        );
        tracing::info!(
            "  phases:     poll={}s, max_wait={}s",
            self.scheduler.phase_poll_secs,
            self.scheduler.phase_max_wait_secs
        );
        tracing::info!(
            "  jobs:       analysis_top_n={}, news_top_n={}, news_per_symbol={}, model={}, signal_top_n={}",
            self.scheduler.analysis_top_n,
            self.scheduler.news_top_n,
            self.scheduler.news_per_symbol,
            self.scheduler.news_model,
            self.scheduler.signal_top_n
        );
    }
}

// ── Tasks ─────────────────────────────────────────────────────

/// Settings for the task runner, the concurrency gate and task streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// How long a new task may wait for the concurrency gate before failing.
    pub gate_acquire_timeout_secs: u64,
    /// Poll interval of the per-task live-status stream.
    pub task_stream_poll_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            gate_acquire_timeout_secs: 5,
            task_stream_poll_ms: 500,
        }
    }
}

impl TaskConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            gate_acquire_timeout_secs: profiled_env_u64(
                p,
                "GATE_ACQUIRE_TIMEOUT_SECS",
                d.gate_acquire_timeout_secs,
            ),
            task_stream_poll_ms: profiled_env_u64(p, "TASK_STREAM_POLL_MS", d.task_stream_poll_ms),
        }
    }

    pub fn gate_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_acquire_timeout_secs)
    }

    pub fn task_stream_poll(&self) -> Duration {
        Duration::from_millis(self.task_stream_poll_ms)
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Job triggers, phase waits and the parameters the scheduled jobs pass on.
///
/// Cron expressions are evaluated in UTC and may use 5 or 6 fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub daily_cron: String,
    pub strategy_interval_secs: u64,
    pub review_cron: String,
    pub startup_delay_secs: u64,
    pub phase_poll_secs: u64,
    pub phase_max_wait_secs: u64,
    pub tick_ms: u64,
    pub status_stream_poll_secs: u64,
    pub run_now_delay_secs: u64,
    pub analysis_top_n: u32,
    pub news_top_n: u32,
    pub news_per_symbol: u32,
    pub news_model: String,
    pub signal_top_n: u32,
    pub review_output: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_cron: "0 0 * * *".to_string(),
            strategy_interval_secs: 600,
            review_cron: "0 1 * * *".to_string(),
            startup_delay_secs: 3,
            phase_poll_secs: 10,
            phase_max_wait_secs: 3600,
            tick_ms: 1000,
            status_stream_poll_secs: 2,
            run_now_delay_secs: 1,
            analysis_top_n: 20,
            news_top_n: 10,
            news_per_symbol: 3,
            news_model: "gpt-oss-120b".to_string(),
            signal_top_n: 5,
            review_output: PathBuf::from("debug_output/timeframe_analysis.json"),
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            enabled: profiled_env_bool(p, "SCHEDULER_ENABLED", d.enabled),
            daily_cron: profiled_env_or(p, "DAILY_CRON", &d.daily_cron),
            strategy_interval_secs: profiled_env_u64(
                p,
                "STRATEGY_INTERVAL_SECS",
                d.strategy_interval_secs,
            ),
            review_cron: profiled_env_or(p, "REVIEW_CRON", &d.review_cron),
            startup_delay_secs: profiled_env_u64(p, "STARTUP_DELAY_SECS", d.startup_delay_secs),
            phase_poll_secs: profiled_env_u64(p, "PHASE_POLL_SECS", d.phase_poll_secs),
            phase_max_wait_secs: profiled_env_u64(p, "PHASE_MAX_WAIT_SECS", d.phase_max_wait_secs),
            tick_ms: profiled_env_u64(p, "SCHEDULER_TICK_MS", d.tick_ms),
            status_stream_poll_secs: profiled_env_u64(
                p,
                "STATUS_STREAM_POLL_SECS",
                d.status_stream_poll_secs,
            ),
            run_now_delay_secs: profiled_env_u64(p, "RUN_NOW_DELAY_SECS", d.run_now_delay_secs),
            analysis_top_n: profiled_env_u32(p, "ANALYSIS_TOP_N", d.analysis_top_n),
            news_top_n: profiled_env_u32(p, "NEWS_TOP_N", d.news_top_n),
            news_per_symbol: profiled_env_u32(p, "NEWS_PER_SYMBOL", d.news_per_symbol),
            news_model: profiled_env_or(p, "NEWS_MODEL", &d.news_model),
            signal_top_n: profiled_env_u32(p, "SIGNAL_TOP_N", d.signal_top_n),
            review_output: PathBuf::from(profiled_env_or(
                p,
                "REVIEW_OUTPUT",
                d.review_output.to_str().unwrap_or("debug_output/timeframe_analysis.json"),
            )),
        }
    }

    pub fn strategy_interval(&self) -> Duration {
        Duration::from_secs(self.strategy_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn phase_poll_interval(&self) -> Duration {
        Duration::from_secs(self.phase_poll_secs)
    }

    pub fn phase_max_wait(&self) -> Duration {
        Duration::from_secs(self.phase_max_wait_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn status_stream_poll(&self) -> Duration {
        Duration::from_secs(self.status_stream_poll_secs)
    }

    pub fn run_now_delay(&self) -> Duration {
        Duration::from_secs(self.run_now_delay_secs)
    }
}
