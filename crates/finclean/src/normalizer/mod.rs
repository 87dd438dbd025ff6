//! Structural cleanup applied to every imported table.
//!
//! In order: column names are trimmed (a collision is a `SchemaError`), blank
//! strings become null (plus missing markers such as `#N/A` for file
//! sources), rows and columns that are entirely null are dropped, and text
//! columns whose every value is a number are reinterpreted as numbers.
//! Blanks are nulled before the drop so a row of empty cells counts as empty.

mod coercion;
mod structure;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CleaningError, Result};

/// Per-import normalization switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Treat spreadsheet spellings of missing (`#N/A`, `NULL`, ...) as null.
    pub missing_markers: bool,
}

/// What the normalizer changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub rows_dropped: usize,
    pub columns_dropped: Vec<String>,
    pub renamed_columns: Vec<(String, String)>,
    pub values_nulled: usize,
    pub numeric_columns: Vec<String>,
}

pub struct TableNormalizer;

impl TableNormalizer {
    /// Normalize a raw table. Fails with `SchemaError` on a name collision and
    /// `ImportError` when nothing is left.
    pub fn normalize(
        df: DataFrame,
        options: &NormalizeOptions,
    ) -> Result<(DataFrame, NormalizationReport)> {
        let mut report = NormalizationReport::default();

        let (df, renamed) = structure::trim_column_names(df)?;
        report.renamed_columns = renamed;

        let (df, nulled) = coercion::null_blank_values(df, options.missing_markers)?;
        report.values_nulled = nulled;

        let (df, dropped_cols) = structure::drop_null_columns(df)?;
        report.columns_dropped = dropped_cols;

        let (df, dropped_rows) = structure::drop_null_rows(df)?;
        report.rows_dropped = dropped_rows;

        let (df, numeric) = coercion::coerce_numeric_text(df)?;
        report.numeric_columns = numeric;

        if df.width() == 0 || df.height() == 0 {
            return Err(CleaningError::Import(
                "no usable data after normalization".to_string(),
            ));
        }

        debug!(
            "Normalized table: dropped {} rows and {} columns, nulled {} values, {} text columns reinterpreted as numbers",
            report.rows_dropped,
            report.columns_dropped.len(),
            report.values_nulled,
            report.numeric_columns.len()
        );

        Ok((df, report))
    }
}
