//! Table merging.

use std::collections::HashSet;

use polars::prelude::*;
use tracing::debug;

use crate::error::{CleaningError, Result};
use crate::types::{JoinKind, MergeOutcome};
use crate::utils::column_names;

impl From<JoinKind> for JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Left => JoinType::Left,
            JoinKind::Right => JoinType::Right,
            JoinKind::Inner => JoinType::Inner,
            JoinKind::Outer => JoinType::Full,
        }
    }
}

/// Which non-key columns receive a suffix before joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuffixMode {
    /// Only names present on both sides.
    Overlapping,
    /// Every non-key column.
    All,
}

/// Merge `right` into `left` on the key columns.
///
/// Overlapping non-key columns get `suffixes.0` on the left and `suffixes.1`
/// on the right. Outer joins coalesce the keys.
pub fn merge_datasets(
    left: &DataFrame,
    right: &DataFrame,
    on: &[String],
    how: JoinKind,
    suffixes: (&str, &str),
) -> Result<(DataFrame, MergeOutcome)> {
    let (merged, renamed) = join_frames(left, right, on, how, suffixes, SuffixMode::Overlapping)?;

    debug!(
        "Merged on {:?} ({}): {:?} + {:?} -> {:?}",
        on,
        how.as_str(),
        left.shape(),
        right.shape(),
        merged.shape()
    );

    let outcome = MergeOutcome {
        merge_columns: on.to_vec(),
        merge_type: how,
        renamed_columns: renamed,
        resulting_shape: merged.shape(),
    };
    Ok((merged, outcome))
}

/// Join two tables after suffixing non-key columns.
///
/// Returns the joined table and the `(original, renamed)` pairs, left side
/// first. Missing keys are a `SchemaError`, and so is a suffixed name that
/// collides with another column. Key columns whose types differ are
/// compared as text.
pub(crate) fn join_frames(
    left: &DataFrame,
    right: &DataFrame,
    on: &[String],
    how: JoinKind,
    (left_suffix, right_suffix): (&str, &str),
    mode: SuffixMode,
) -> Result<(DataFrame, Vec<(String, String)>)> {
    if on.is_empty() {
        return Err(CleaningError::Schema(
            "at least one merge column is required".to_string(),
        ));
    }
    for key in on {
        for (side, df) in [("left", left), ("right", right)] {
            if df.column(key).is_err() {
                return Err(CleaningError::Schema(format!(
                    "merge column '{key}' not found in {side} table"
                )));
            }
        }
    }

    let mut left = left.clone();
    let mut right = right.clone();

    for key in on {
        let left_dtype = left.column(key)?.dtype().clone();
        let right_dtype = right.column(key)?.dtype().clone();
        if left_dtype != right_dtype {
            debug!(
                "Key '{}' has types {} and {}; comparing as text",
                key, left_dtype, right_dtype
            );
            let l = left.column(key)?.as_materialized_series().cast(&DataType::String)?;
            let r = right.column(key)?.as_materialized_series().cast(&DataType::String)?;
            left.replace(key, l)?;
            right.replace(key, r)?;
        }
    }

    let left_names = column_names(&left);
    let right_names = column_names(&right);
    let is_key = |name: &String| on.contains(name);

    let plan = |names: &[String], other: &[String], suffix: &str| -> Vec<(String, String)> {
        names
            .iter()
            .filter(|n| !is_key(*n) && (mode == SuffixMode::All || other.contains(*n)))
            .map(|name| (name.clone(), format!("{name}{suffix}")))
            .collect()
    };
    let left_pairs = plan(&left_names, &right_names, left_suffix);
    let right_pairs = plan(&right_names, &left_names, right_suffix);

    let renamed_name = |name: &String, pairs: &[(String, String)]| -> String {
        pairs
            .iter()
            .find(|(old, _)| old == name)
            .map_or_else(|| name.clone(), |(_, new)| new.clone())
    };
    // Keys coalesce, so only the left copy of each key survives the join.
    let mut taken: HashSet<String> = HashSet::new();
    let result_names = left_names
        .iter()
        .map(|n| renamed_name(n, &left_pairs))
        .chain(
            right_names
                .iter()
                .filter(|n| !is_key(*n))
                .map(|n| renamed_name(n, &right_pairs)),
        );
    for name in result_names {
        if !taken.insert(name.clone()) {
            return Err(CleaningError::Schema(format!(
                "column '{name}' would appear twice after suffixing; rename it first"
            )));
        }
    }

    for (df, pairs) in [(&mut left, &left_pairs), (&mut right, &right_pairs)] {
        for (old, new) in pairs {
            df.rename(old, new.as_str().into())?;
        }
    }
    let renamed: Vec<(String, String)> = left_pairs.into_iter().chain(right_pairs).collect();

    let positions = (unused_name(LEFT_ROW, &taken), unused_name(RIGHT_ROW, &taken));
    left.with_column(row_positions(&positions.0, left.height()))?;
    right.with_column(row_positions(&positions.1, right.height()))?;

    let keys: Vec<Expr> = on.iter().map(|k| col(k.as_str())).collect();
    let args = JoinArgs::new(how.into()).with_coalesce(JoinCoalesce::CoalesceColumns);
    let merged = left
        .lazy()
        .join(right.lazy(), keys.clone(), keys, args)
        .collect()?;

    Ok((restore_order(merged, how, &positions)?, renamed))
}

const LEFT_ROW: &str = "__left_row";
const RIGHT_ROW: &str = "__right_row";

/// `base`, extended with underscores until no column uses it.
fn unused_name(base: &str, taken: &HashSet<String>) -> String {
    let mut name = base.to_string();
    while taken.contains(&name) {
        name.push('_');
    }
    name
}

fn row_positions(name: &str, height: usize) -> Series {
    Series::new(name.into(), (0..height as u64).collect::<Vec<u64>>())
}

/// Put joined rows back in input order: the driving side first (right for a
/// right join, left otherwise), unmatched rows of the other side last.
fn restore_order(
    df: DataFrame,
    how: JoinKind,
    (left_row, right_row): &(String, String),
) -> PolarsResult<DataFrame> {
    let positions = |name: &str| -> PolarsResult<Vec<Option<u64>>> {
        Ok(df.column(name)?.as_materialized_series().u64()?.into_iter().collect())
    };
    let left = positions(left_row)?;
    let right = positions(right_row)?;

    let mut order: Vec<usize> = (0..df.height()).collect();
    order.sort_by_key(|&i| {
        let (first, second) = match how {
            JoinKind::Right => (right[i], left[i]),
            _ => (left[i], right[i]),
        };
        (first.is_none(), first, second.is_none(), second)
    });

    let idx = IdxCa::from_vec(
        "idx".into(),
        order.into_iter().map(|i| i as IdxSize).collect(),
    );
    df.take(&idx)?.drop(left_row)?.drop(right_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger() -> DataFrame {
        df!(
            "id" => &[1i64, 2, 3],
            "amount" => &[10.0f64, 20.0, 30.0],
        )
        .unwrap()
    }

    fn suffixes() -> (&'static str, &'static str) {
        ("_x", "_y")
    }

    #[test]
    fn test_self_merge_inner_and_outer() {
        let df = ledger();
        let on = vec!["id".to_string()];

        let (inner, outcome) =
            merge_datasets(&df, &df, &on, JoinKind::Inner, suffixes()).unwrap();
        assert_eq!(inner.height(), 3);
        assert_eq!(column_names(&inner), vec!["id", "amount_x", "amount_y"]);
        assert_eq!(outcome.resulting_shape, (3, 3));

        let (outer, _) = merge_datasets(&df, &df, &on, JoinKind::Outer, suffixes()).unwrap();
        assert_eq!(outer.height(), 3);
        assert!(outer.column("id").is_ok());
    }

    #[test]
    fn test_left_merge_keeps_unmatched_rows() {
        let right = df!(
            "id" => &[1i64, 4],
            "region" => &["north", "south"],
        )
        .unwrap();
        let on = vec!["id".to_string()];
        let (merged, outcome) =
            merge_datasets(&ledger(), &right, &on, JoinKind::Left, suffixes()).unwrap();

        assert_eq!(merged.height(), 3);
        assert_eq!(merged.column("region").unwrap().null_count(), 2);
        assert!(outcome.renamed_columns.is_empty());
    }

    #[test]
    fn test_outer_merge_coalesces_keys() {
        let right = df!(
            "id" => &[3i64, 4],
            "amount" => &[1.0f64, 2.0],
        )
        .unwrap();
        let on = vec!["id".to_string()];
        let (merged, _) =
            merge_datasets(&ledger(), &right, &on, JoinKind::Outer, suffixes()).unwrap();

        assert_eq!(merged.height(), 4);
        assert_eq!(merged.column("id").unwrap().null_count(), 0);
    }

    #[test]
    fn test_key_type_mismatch_compared_as_text() {
        let right = df!(
            "id" => &["1", "2"],
            "flag" => &[true, false],
        )
        .unwrap();
        let on = vec!["id".to_string()];
        let (merged, _) =
            merge_datasets(&ledger(), &right, &on, JoinKind::Inner, suffixes()).unwrap();
        assert_eq!(merged.height(), 2);
        assert_eq!(merged.column("id").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_missing_key_is_schema_error() {
        let right = df!("other" => &[1i64]).unwrap();
        let on = vec!["id".to_string()];
        let err =
            merge_datasets(&ledger(), &right, &on, JoinKind::Inner, suffixes()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_suffixed_name_clash_is_schema_error() {
        let on = vec!["id".to_string()];
        let right = ledger();

        let left = df!(
            "id" => &[1i64],
            "amount" => &[1.0f64],
            "amount_x" => &[2.0f64],
        )
        .unwrap();
        let err = merge_datasets(&left, &right, &on, JoinKind::Inner, suffixes()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert!(err.to_string().contains("'amount_x'"));

        let left = df!(
            "id" => &[1i64],
            "amount" => &[1.0f64],
            "amount_y" => &[2.0f64],
        )
        .unwrap();
        let err = merge_datasets(&left, &right, &on, JoinKind::Left, suffixes()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert!(err.to_string().contains("'amount_y'"));
    }

    #[test]
    fn test_user_columns_named_like_row_helpers() {
        let left = df!(
            "id" => &[2i64, 1],
            "__left_row" => &["b", "a"],
        )
        .unwrap();
        let right = df!(
            "id" => &[1i64, 2],
            "__right_row" => &[10i64, 20],
        )
        .unwrap();
        let on = vec!["id".to_string()];
        let (joined, _) = merge_datasets(&left, &right, &on, JoinKind::Left, suffixes()).unwrap();

        assert_eq!(column_names(&joined), vec!["id", "__left_row", "__right_row"]);
        let tags: Vec<Option<&str>> = joined
            .column("__left_row")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(tags, vec![Some("b"), Some("a")]);
        let amounts: Vec<Option<i64>> = joined
            .column("__right_row")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(amounts, vec![Some(20), Some(10)]);
    }

    #[test]
    fn test_suffix_all_columns() {
        let right = df!("id" => &[1i64], "amount" => &[5.0f64], "memo" => &["a"]).unwrap();
        let on = vec!["id".to_string()];
        let (joined, renamed) = join_frames(
            &ledger(),
            &right,
            &on,
            JoinKind::Inner,
            ("_budget", "_actual"),
            SuffixMode::All,
        )
        .unwrap();

        assert_eq!(
            column_names(&joined),
            vec!["id", "amount_budget", "amount_actual", "memo_actual"]
        );
        assert_eq!(renamed.len(), 3);
    }
}
