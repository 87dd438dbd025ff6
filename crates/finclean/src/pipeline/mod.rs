//! Pipeline module.
//!
//! The stateful orchestrator that owns the original and working tables, runs
//! cleaning operations against them and keeps the operation log.

mod builder;
mod export;
mod shared;
mod state;

pub use builder::{Pipeline, PipelineBuilder};
pub(crate) use builder::load_source;
pub use export::{export_table, to_csv_text, to_json_text, to_records};
pub use shared::SharedPipeline;
pub use state::PipelineState;
