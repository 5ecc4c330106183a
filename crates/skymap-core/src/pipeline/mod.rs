pub mod config;
pub mod orchestrator;
pub mod types;

pub use orchestrator::{run_reduction, run_reduction_with_reporter};
