//! Instrumented stand-in computation.
//!
//! Walks through a fixed number of steps, sleeping between them, with a
//! cancellation checkpoint before every step. Used by the worker binary when
//! no real market-data backend is wired in, and by the test suites to drive
//! the runner through every outcome.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::computation::Computation;
use crate::context::TaskContext;

/// Gate-held interval recorded by a [`SyntheticComputation`].
pub type HeldInterval = (Instant, Instant);

#[derive(Debug, Clone)]
pub struct SyntheticComputation {
    name: String,
    steps: u32,
    delay: Duration,
    fail_at: Option<u32>,
    panic_at: Option<u32>,
    intervals: Option<Arc<Mutex<Vec<HeldInterval>>>>,
}

impl SyntheticComputation {
    pub fn new(name: impl Into<String>, steps: u32, delay: Duration) -> Self {
        Self {
            name: name.into(),
            steps: steps.max(1),
            delay,
            fail_at: None,
            panic_at: None,
            intervals: None,
        }
    }

    /// Return an error after completing `step` (zero-based).
    pub fn failing_at(mut self, step: u32) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Panic after completing `step` (zero-based).
    pub fn panicking_at(mut self, step: u32) -> Self {
        self.panic_at = Some(step);
        self
    }

    /// Record the start/end instant of every run into `sink`.
    pub fn recording(mut self, sink: Arc<Mutex<Vec<HeldInterval>>>) -> Self {
        self.intervals = Some(sink);
        self
    }
}

#[async_trait]
impl Computation for SyntheticComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()> {
        let started = Instant::now();
        let top_n = ctx.params().top_n();

        for step in 0..self.steps {
            ctx.checkpoint()?;
            tokio::time::sleep(self.delay).await;
            let progress = f64::from(step + 1) / f64::from(self.steps);
            ctx.report(progress, format!("{}: step {}/{}", self.name, step + 1, self.steps))?;

            if self.fail_at == Some(step) {
                anyhow::bail!("{} failed at step {}", self.name, step + 1);
            }
            if self.panic_at == Some(step) {
                panic!("{} panicked at step {}", self.name, step + 1);
            }
        }
        ctx.checkpoint()?;

        if let Some(sink) = &self.intervals {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((started, Instant::now()));
        }

        let ranking: Vec<String> = (1..=top_n).map(|i| format!("SYN{}/USDT", i)).collect();
        ctx.complete(json!({
            "computation": self.name,
            "count": top_n,
            "steps": self.steps,
            "ranking": ranking,
        }))?;
        Ok(())
    }
}
