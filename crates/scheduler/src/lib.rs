//! Cron/interval scheduler for the daily trading sequence and its
//! auxiliary jobs, built on top of `daybreak-tasks`.

pub mod collaborators;
mod controls;
mod core;
pub mod daily;
pub mod error;
pub mod job;
mod jobs;
pub mod paper;
pub mod status;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
pub use collaborators::{
    ExecutionSummary, JobCollaborators, PatternStrategy, Position, Side, Signal, SignalBatch,
    SignalDesk, StartupHook, TimeframeReviewer,
};
pub use daily::{DailyPhase, DailyRunOutcome, PhaseOutcome};
pub use error::SchedulerError;
pub use job::{JobAction, JobKind, JobSpec};
pub use status::{CurrentTaskSummary, SchedulerStatus};
pub use trigger::{parse_cron, Trigger};
