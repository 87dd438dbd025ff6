use polars::prelude::*;
use tracing::debug;

use crate::error::{CleaningError, Result};
use crate::types::{DedupOutcome, KeepStrategy};
use crate::utils::column_names;

/// Remove duplicate rows, comparing `subset` (the whole row when `None`).
///
/// Values compare the way polars groups them: nulls equal nulls and `-0.0`
/// equals `0.0`. Survivors keep their original relative order. A subset
/// column that does not exist is a `SchemaError`.
pub fn deduplicate(
    df: &DataFrame,
    subset: Option<&[String]>,
    keep: KeepStrategy,
) -> Result<(DataFrame, DedupOutcome)> {
    let key_columns = match subset {
        Some(names) => {
            let missing: Vec<&str> = names
                .iter()
                .filter(|name| df.column(name).is_err())
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(CleaningError::Schema(format!(
                    "deduplication columns not found: {}",
                    missing.join(", ")
                )));
            }
            names.to_vec()
        }
        None => column_names(df),
    };

    let strategy = match keep {
        KeepStrategy::First => UniqueKeepStrategy::First,
        KeepStrategy::Last => UniqueKeepStrategy::Last,
    };
    let result = df.unique_stable(Some(key_columns.as_slice()), strategy, None)?;
    let rows_removed = df.height() - result.height();

    debug!(
        "Deduplicated on {} columns (keep {}): removed {} rows",
        key_columns.len(),
        keep.as_str(),
        rows_removed
    );

    Ok((
        result,
        DedupOutcome {
            columns_considered: subset.map(<[String]>::to_vec),
            keep_strategy: keep,
            rows_removed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{series_of, series_to_text};

    fn sample() -> DataFrame {
        df!(
            "k" => &[Some(1i64), Some(1), Some(2), None, None],
            "v" => &["a", "b", "c", "d", "d"],
        )
        .unwrap()
    }

    #[test]
    fn test_subset_keep_first() {
        let (result, outcome) =
            deduplicate(&sample(), Some(&["k".to_string()]), KeepStrategy::First).unwrap();
        assert_eq!(outcome.rows_removed, 2);
        let v = series_to_text(&series_of(&result, "v").unwrap()).unwrap();
        assert_eq!(
            v,
            vec![Some("a".to_string()), Some("c".to_string()), Some("d".to_string())]
        );
    }

    #[test]
    fn test_subset_keep_last_preserves_order() {
        let (result, _) =
            deduplicate(&sample(), Some(&["k".to_string()]), KeepStrategy::Last).unwrap();
        let v = series_to_text(&series_of(&result, "v").unwrap()).unwrap();
        assert_eq!(
            v,
            vec![Some("b".to_string()), Some("c".to_string()), Some("d".to_string())]
        );
    }

    #[test]
    fn test_whole_row_and_idempotence() {
        let (once, outcome) = deduplicate(&sample(), None, KeepStrategy::First).unwrap();
        assert_eq!(outcome.rows_removed, 1);
        assert_eq!(outcome.columns_considered, None);

        let (twice, outcome) = deduplicate(&once, None, KeepStrategy::First).unwrap();
        assert_eq!(outcome.rows_removed, 0);
        assert!(twice.equals_missing(&once));
    }

    #[test]
    fn test_signed_zero_is_a_duplicate() {
        let df = df!("k" => &[0.0f64, -0.0, 1.0]).unwrap();
        let (result, outcome) =
            deduplicate(&df, Some(&["k".to_string()]), KeepStrategy::First).unwrap();
        assert_eq!(outcome.rows_removed, 1);
        assert_eq!(result.height(), 2);
    }

    #[test]
    fn test_unknown_subset_column() {
        let err = deduplicate(&sample(), Some(&["nope".to_string()]), KeepStrategy::First)
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }
}
