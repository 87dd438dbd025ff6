//! Cleaning operations.
//!
//! Each operation takes the current table by reference and returns a new
//! table together with an outcome record that the pipeline writes into the
//! operation log. None of them touch pipeline state.
//!
//! Per-column problems (unknown column, unsupported method, wrong type) are
//! reported in the outcome's `skipped` list and logged with `warn!`; only
//! structural problems are returned as errors.

mod dedup;
mod imputation;
mod merge;
mod scaling;
mod verify;

pub use dedup::deduplicate;
pub use imputation::rebuild_missing_data;
pub use merge::merge_datasets;
pub(crate) use merge::{SuffixMode, join_frames};
pub use scaling::{ScaleMethod, normalize, scale_columns, standardize};
pub use verify::verify_and_enrich;

use polars::prelude::*;

use crate::types::SkippedColumn;
use crate::utils::is_numeric_dtype;

/// Resolve a requested column selection against the table.
///
/// `None` selects every numeric column. Requested names that are missing or
/// non-numeric land in the skipped list instead.
pub(crate) fn numeric_targets(
    df: &DataFrame,
    requested: Option<&[String]>,
) -> (Vec<String>, Vec<SkippedColumn>) {
    let mut targets = Vec::new();
    let mut skipped = Vec::new();

    match requested {
        None => {
            for col in df.get_columns() {
                if is_numeric_dtype(col.dtype()) {
                    targets.push(col.name().to_string());
                }
            }
        }
        Some(names) => {
            for name in names {
                match df.column(name) {
                    Err(_) => skipped.push(SkippedColumn::new(name, "column not found")),
                    Ok(col) if !is_numeric_dtype(col.dtype()) => skipped.push(SkippedColumn::new(
                        name,
                        format!("column is not numeric ({})", col.dtype()),
                    )),
                    Ok(_) => {
                        if !targets.contains(name) {
                            targets.push(name.clone());
                        }
                    }
                }
            }
        }
    }

    (targets, skipped)
}
