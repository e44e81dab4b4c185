pub mod cancel;
pub mod computation;
pub mod context;
pub mod error;
pub mod gate;
pub mod notifier;
pub mod registry;
pub mod runner;
pub mod synthetic;
pub mod task;

pub use cancel::{CancelSignal, SignalMap};
pub use computation::{Computation, Computations};
pub use context::TaskContext;
pub use error::TaskError;
pub use gate::ConcurrencyGate;
pub use registry::TaskRegistry;
pub use runner::TaskRunner;
pub use synthetic::SyntheticComputation;
pub use task::{AnalysisParams, NewsParams, Task, TaskKind, TaskParams, TaskStatus};
