//! Missing-value imputation.
//!
//! Mean and median fill numeric columns (the result is `Float64`), mode fills
//! any column while keeping its type, and forward/backward fill propagate the
//! nearest non-null neighbour.

use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{ImputationMethod, ImputationOutcome, SkippedColumn};
use crate::utils::{is_numeric_dtype, series_of, series_to_f64, series_to_text};

/// Fill missing values per column.
///
/// `methods` pairs a column with a method name (`mean`, `median`, `mode`,
/// `forward_fill`/`ffill`, `backward_fill`/`bfill`). Unknown columns,
/// unsupported method names and mean/median on non-numeric columns are
/// skipped.
pub fn rebuild_missing_data(
    df: &DataFrame,
    methods: &[(String, String)],
) -> Result<(DataFrame, ImputationOutcome)> {
    let mut result = df.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for (column, method_name) in methods {
        let method = match method_name.parse::<ImputationMethod>() {
            Ok(method) => method,
            Err(reason) => {
                warn!("Skipping '{}': {}", column, reason);
                skipped.push(SkippedColumn::new(column, reason));
                continue;
            }
        };

        if result.column(column).is_err() {
            warn!("Column '{}' not found in dataset", column);
            skipped.push(SkippedColumn::new(column, "column not found"));
            continue;
        }

        let series = series_of(&result, column)?;
        match impute_series(&series, method)? {
            Filled::Series(filled) => {
                debug!(
                    "Imputed '{}' with {}: {} -> {} nulls",
                    column,
                    method,
                    series.null_count(),
                    filled.null_count()
                );
                result.replace(column, filled)?;
                applied.push((column.clone(), method.as_str().to_string()));
            }
            Filled::Skipped(reason) => {
                warn!("Skipping '{}' ({}): {}", column, method, reason);
                skipped.push(SkippedColumn::new(column, reason));
            }
        }
    }

    let missing_values_remaining: BTreeMap<String, usize> = result
        .get_columns()
        .iter()
        .map(|col| (col.name().to_string(), col.null_count()))
        .collect();

    Ok((
        result,
        ImputationOutcome {
            methods_applied: applied,
            skipped,
            missing_values_remaining,
        },
    ))
}

enum Filled {
    Series(Series),
    Skipped(String),
}

fn impute_series(series: &Series, method: ImputationMethod) -> Result<Filled> {
    if method.requires_numeric() && !is_numeric_dtype(series.dtype()) {
        return Ok(Filled::Skipped(format!(
            "{method} requires a numeric column, found {}",
            series.dtype()
        )));
    }

    let filled = match method {
        ImputationMethod::Mean => match series.mean() {
            Some(mean) => fill_with_value(series, mean)?,
            None => return Ok(Filled::Skipped("column has no values".to_string())),
        },
        ImputationMethod::Median => match series.median() {
            Some(median) => fill_with_value(series, median)?,
            None => return Ok(Filled::Skipped("column has no values".to_string())),
        },
        ImputationMethod::Mode => match mode_index(series)? {
            Some(idx) => fill_from_row(series, idx)?,
            None => return Ok(Filled::Skipped("column has no values".to_string())),
        },
        ImputationMethod::ForwardFill => series.fill_null(FillNullStrategy::Forward(None))?,
        ImputationMethod::BackwardFill => series.fill_null(FillNullStrategy::Backward(None))?,
    };

    Ok(Filled::Series(filled))
}

/// Fill a numeric column with a constant; the result is `Float64`.
fn fill_with_value(series: &Series, fill_value: f64) -> Result<Series> {
    let values: Vec<Option<f64>> = series_to_f64(series)?
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill_value)))
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

/// Row index of the first occurrence of the most frequent non-null value.
fn mode_index(series: &Series) -> Result<Option<usize>> {
    let keys = series_to_text(series)?;
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for (idx, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            counts.entry(key.as_str()).or_insert((0, idx)).0 += 1;
        }
    }

    // Highest count wins; ties go to the earliest first occurrence.
    Ok(counts
        .into_values()
        .max_by(|(count_a, first_a), (count_b, first_b)| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(_, first)| first))
}

/// Replace every null with the value found at `source_row`, keeping the dtype.
fn fill_from_row(series: &Series, source_row: usize) -> Result<Series> {
    let nulls = series.is_null();
    let indices: Vec<IdxSize> = nulls
        .into_iter()
        .enumerate()
        .map(|(i, is_null)| {
            if is_null.unwrap_or(false) {
                source_row as IdxSize
            } else {
                i as IdxSize
            }
        })
        .collect();
    let idx = IdxCa::from_vec("idx".into(), indices);
    Ok(series.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn methods(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(c, m)| (c.to_string(), m.to_string()))
            .collect()
    }

    fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        series_to_f64(&series_of(df, name).unwrap()).unwrap()
    }

    #[test]
    fn test_mean_imputation() {
        let df = df!("x" => &[Some(1i64), None, Some(3)]).unwrap();
        let (result, outcome) = rebuild_missing_data(&df, &methods(&[("x", "mean")])).unwrap();

        assert_eq!(f64_values(&result, "x"), vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(result.column("x").unwrap().dtype(), &DataType::Float64);
        assert_eq!(outcome.missing_values_remaining["x"], 0);
        assert_eq!(
            outcome.methods_applied,
            vec![("x".to_string(), "mean".to_string())]
        );
    }

    #[test]
    fn test_median_imputation() {
        let df = df!("x" => &[Some(1.0f64), None, Some(3.0), Some(10.0)]).unwrap();
        let (result, _) = rebuild_missing_data(&df, &methods(&[("x", "median")])).unwrap();
        assert_eq!(f64_values(&result, "x")[1], Some(3.0));
    }

    #[test]
    fn test_mode_keeps_type_and_breaks_ties_by_first_occurrence() {
        let df = df!(
            "cat" => &[Some("b"), Some("a"), None, Some("a"), Some("b")],
            "n" => &[Some(7i64), Some(7), None, Some(2), Some(2)],
        )
        .unwrap();
        let (result, _) =
            rebuild_missing_data(&df, &methods(&[("cat", "mode"), ("n", "mode")])).unwrap();

        let cat = series_of(&result, "cat").unwrap();
        assert_eq!(cat.str().unwrap().get(2), Some("b"));

        let n = series_of(&result, "n").unwrap();
        assert_eq!(n.dtype(), &DataType::Int64);
        assert_eq!(n.i64().unwrap().get(2), Some(7));
    }

    #[test]
    fn test_forward_and_backward_fill() {
        let df = df!(
            "f" => &[None, Some(1i64), None, Some(3)],
            "b" => &[Some(1i64), None, Some(3), None],
        )
        .unwrap();
        let (result, outcome) = rebuild_missing_data(
            &df,
            &methods(&[("f", "ffill"), ("b", "backward_fill")]),
        )
        .unwrap();

        let f = series_of(&result, "f").unwrap();
        let f: Vec<Option<i64>> = f.i64().unwrap().into_iter().collect();
        assert_eq!(f, vec![None, Some(1), Some(1), Some(3)]);

        let b = series_of(&result, "b").unwrap();
        let b: Vec<Option<i64>> = b.i64().unwrap().into_iter().collect();
        assert_eq!(b, vec![Some(1), Some(3), Some(3), None]);

        assert_eq!(outcome.missing_values_remaining["f"], 1);
        assert_eq!(outcome.missing_values_remaining["b"], 1);
    }

    #[test]
    fn test_soft_failures_are_skipped() {
        let df = df!(
            "name" => &[Some("a"), None],
            "x" => &[Some(1.0f64), None],
        )
        .unwrap();
        let (result, outcome) = rebuild_missing_data(
            &df,
            &methods(&[("name", "mean"), ("ghost", "mode"), ("x", "interpolate")]),
        )
        .unwrap();

        assert_eq!(outcome.skipped.len(), 3);
        assert!(outcome.methods_applied.is_empty());
        assert_eq!(result.column("x").unwrap().null_count(), 1);
        assert_eq!(outcome.skipped[1].column, "ghost");
    }
}
