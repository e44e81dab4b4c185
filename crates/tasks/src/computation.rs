//! The collaborator seam for heavyweight computations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::TaskContext;
use crate::task::TaskKind;

/// A long-running computation driven by the task runner.
///
/// Implementations report progress through the context, call
/// [`TaskContext::checkpoint`] between units of work, and finish with
/// [`TaskContext::complete`]. Returning an error marks the task failed unless
/// it is a [`TaskError::Cancelled`](crate::TaskError::Cancelled).
#[async_trait]
pub trait Computation: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()>;
}

/// Registered computation per task kind.
#[derive(Clone, Default)]
pub struct Computations {
    by_kind: HashMap<TaskKind, Arc<dyn Computation>>,
}

impl Computations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: TaskKind, computation: Arc<dyn Computation>) -> Self {
        self.register(kind, computation);
        self
    }

    pub fn register(&mut self, kind: TaskKind, computation: Arc<dyn Computation>) {
        self.by_kind.insert(kind, computation);
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn Computation>> {
        self.by_kind.get(&kind).cloned()
    }
}

impl std::fmt::Debug for Computations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .by_kind
            .iter()
            .map(|(kind, c)| format!("{}={}", kind, c.name()))
            .collect();
        names.sort();
        f.debug_struct("Computations").field("registered", &names).finish()
    }
}
