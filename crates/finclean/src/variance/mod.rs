//! Budget-versus-actual variance analysis.
//!
//! [`VarianceEngine`] imports both sides through the same sources and
//! normalizer as the [`Pipeline`](crate::Pipeline), joins them on date and
//! category keys and derives variance figures.

mod engine;
mod ytd;

pub use engine::VarianceEngine;
