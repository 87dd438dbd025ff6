//! Audit trail of the operations applied to a table.
//!
//! Each [`Pipeline`](crate::Pipeline) and
//! [`VarianceEngine`](crate::VarianceEngine) owns one [`OperationLog`]. An
//! optional [`EntrySink`] sees entries as they are appended.

mod log;
mod sink;

pub use log::{OperationKind, OperationLog, OperationLogEntry};
pub use sink::{ClosureEntrySink, EntrySink};
