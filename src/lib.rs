pub mod assets;
pub mod audit;
pub mod config;
pub mod errors;
pub mod flow;
pub mod fragment;
pub mod generator;
pub mod integrate;
pub mod issue;
pub mod phase;
pub mod registry;
pub mod router;
pub mod template;
pub mod validate;

pub use config::WeaverConfig;
pub use errors::{AssetError, FlowError, GenerationError, IntegrationError};
pub use flow::{ExecutorConfig, FinalReport, FlowExecutor};
pub use phase::FlowPlan;
pub use template::Template;
