//! The auxiliary jobs: pattern strategy, timeframe review and startup hook.

use std::path::{Path, PathBuf};

use tracing::{error, info};
use uuid::Uuid;

use crate::core::Scheduler;
use crate::error::SchedulerError;
use crate::job::JobKind;

impl Scheduler {
    /// Run the pattern strategy once under a synthetic task ID.
    ///
    /// Returns the strategy's report, or `None` when disabled or failed.
    pub async fn run_pattern_strategy(&self) -> Option<serde_json::Value> {
        if !self.is_enabled() {
            info!("scheduler disabled, skipping pattern strategy");
            return None;
        }

        let id = Uuid::new_v4();
        self.set_slot(JobKind::PatternStrategy, id);
        let result = {
            let _slot = self.slot_guard(&[JobKind::PatternStrategy]);
            self.collaborators.pattern_strategy.run(id).await
        };

        match result {
            Ok(report) => {
                info!(task_id = %id, "pattern strategy finished");
                Some(report)
            }
            Err(e) => {
                error!(task_id = %id, error = %format!("{:#}", e), "pattern strategy failed");
                None
            }
        }
    }

    /// Run the timeframe review and write its report for external readers.
    ///
    /// Returns the artifact path, or `None` when disabled.
    pub async fn run_timeframe_review(&self) -> Result<Option<PathBuf>, SchedulerError> {
        if !self.is_enabled() {
            info!("scheduler disabled, skipping timeframe review");
            return Ok(None);
        }

        let id = Uuid::new_v4();
        self.set_slot(JobKind::TimeframeReview, id);
        let result = {
            let _slot = self.slot_guard(&[JobKind::TimeframeReview]);
            self.review_and_write(&self.config.review_output).await
        };

        let path = result?;
        info!(task_id = %id, path = %path.display(), "timeframe review written");
        Ok(Some(path))
    }

    async fn review_and_write(&self, path: &Path) -> Result<PathBuf, SchedulerError> {
        let report = self.collaborators.reviewer.review().await?;
        let body = serde_json::to_string_pretty(&report)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await?;
        Ok(path.to_path_buf())
    }

    /// Fire the startup hook, if one is configured. Failures are logged only.
    pub async fn run_startup_hook(&self) {
        if !self.is_enabled() {
            info!("scheduler disabled, skipping startup hook");
            return;
        }
        let Some(hook) = &self.collaborators.startup_hook else {
            return;
        };
        match hook.run().await {
            Ok(()) => info!("startup hook finished"),
            Err(e) => error!(error = %format!("{:#}", e), "startup hook failed"),
        }
    }
}
