//! Phase scheduling and flow execution.

pub mod builder;
pub mod executor;
pub mod scheduler;
pub mod state;

pub use builder::{FlowBuilder, PhaseGraph};
pub use executor::{ExecutorConfig, FlowExecutor};
pub use scheduler::{FlowScheduler, PhaseStatus};
pub use state::{FinalReport, PhaseRunResult};
