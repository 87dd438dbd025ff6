//! Column scaling: z-score standardization and min-max normalization.
//!
//! Both are the affine map `(x - offset) / scale`; only the parameters
//! differ. Statistics are polars aggregations over the column's current
//! values (population standard deviation). Constant columns map to 0.0.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::numeric_targets;
use crate::error::Result;
use crate::types::{ScaleParameters, ScalingOutcome, SkippedColumn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    /// Zero mean, unit variance.
    Standardize,
    /// Linear into `[0, 1]`.
    Normalize,
}

impl ScaleMethod {
    /// Aggregations for the offset and scale of `name`, aliased by position.
    fn parameter_exprs(&self, index: usize, name: &str) -> [Expr; 2] {
        let x = values_expr(name);
        let (offset, scale) = match self {
            Self::Standardize => (x.clone().mean(), x.std(0)),
            Self::Normalize => (x.clone().min(), x.clone().max() - x.min()),
        };
        [
            offset.alias(format!("offset_{index}")),
            scale.alias(format!("scale_{index}")),
        ]
    }
}

/// Column values as `Float64`, NaN read as missing.
fn values_expr(name: &str) -> Expr {
    col(name).cast(DataType::Float64).fill_nan(lit(NULL))
}

fn scalar(stats: &DataFrame, name: &str) -> Result<Option<f64>> {
    let value = stats
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?
        .f64()?
        .get(0);
    Ok(value)
}

/// Z-score the selected numeric columns (all numeric columns when `None`).
pub fn standardize(
    df: &DataFrame,
    columns: Option<&[String]>,
) -> Result<(DataFrame, ScalingOutcome)> {
    scale_columns(df, columns, ScaleMethod::Standardize)
}

/// Min-max the selected numeric columns into `[0, 1]`.
pub fn normalize(df: &DataFrame, columns: Option<&[String]>) -> Result<(DataFrame, ScalingOutcome)> {
    scale_columns(df, columns, ScaleMethod::Normalize)
}

pub fn scale_columns(
    df: &DataFrame,
    columns: Option<&[String]>,
    method: ScaleMethod,
) -> Result<(DataFrame, ScalingOutcome)> {
    let (targets, mut skipped) = numeric_targets(df, columns);
    for skip in &skipped {
        warn!("Not scaling '{}': {}", skip.column, skip.reason);
    }
    if targets.is_empty() {
        return Ok((
            df.clone(),
            ScalingOutcome {
                columns: Vec::new(),
                skipped,
                constant_columns: Vec::new(),
                parameters: BTreeMap::new(),
            },
        ));
    }

    let stat_exprs: Vec<Expr> = targets
        .iter()
        .enumerate()
        .flat_map(|(i, name)| method.parameter_exprs(i, name))
        .collect();
    let stats = df.clone().lazy().select(stat_exprs).collect()?;

    let mut transforms = Vec::with_capacity(targets.len());
    let mut scaled = Vec::with_capacity(targets.len());
    let mut constant_columns = Vec::new();
    let mut parameters = BTreeMap::new();

    for (i, name) in targets.into_iter().enumerate() {
        let offset = scalar(&stats, &format!("offset_{i}"))?;
        let scale = scalar(&stats, &format!("scale_{i}"))?;
        let (Some(offset), Some(scale)) = (offset, scale) else {
            warn!("Not scaling '{}': column has no values", name);
            skipped.push(SkippedColumn::new(&name, "column has no values"));
            continue;
        };

        let expr = if scale == 0.0 || !scale.is_finite() {
            debug!("'{}' is constant; scaled to 0.0", name);
            constant_columns.push(name.clone());
            values_expr(&name) * lit(0.0)
        } else {
            (values_expr(&name) - lit(offset)) / lit(scale)
        };
        transforms.push(expr.alias(name.as_str()));
        parameters.insert(name.clone(), ScaleParameters { offset, scale });
        scaled.push(name);
    }

    let result = if transforms.is_empty() {
        df.clone()
    } else {
        df.clone().lazy().with_columns(transforms).collect()?
    };

    debug!("{:?} applied to {} columns", method, scaled.len());

    Ok((
        result,
        ScalingOutcome {
            columns: scaled,
            skipped,
            constant_columns,
            parameters,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{series_of, series_to_f64};

    fn values(df: &DataFrame, name: &str) -> Vec<f64> {
        series_to_f64(&series_of(df, name).unwrap())
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let df = df!("x" => &[2.0f64, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        let (result, outcome) = standardize(&df, None).unwrap();

        let x = values(&result, "x");
        let n = x.len() as f64;
        let mean = x.iter().sum::<f64>() / n;
        let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-9);

        let params = outcome.parameters["x"];
        assert!((params.offset - 5.0).abs() < 1e-12);
        assert!((params.scale - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_bounds() {
        let df = df!("x" => &[Some(10i64), None, Some(20), Some(15)]).unwrap();
        let (result, _) = normalize(&df, None).unwrap();

        let x = values(&result, "x");
        assert_eq!(x, vec![0.0, 1.0, 0.5]);
        assert_eq!(result.column("x").unwrap().null_count(), 1);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let df = df!("c" => &[3.0f64, 3.0, 3.0]).unwrap();
        let (result, outcome) = standardize(&df, None).unwrap();
        assert_eq!(values(&result, "c"), vec![0.0, 0.0, 0.0]);
        assert_eq!(outcome.constant_columns, vec!["c".to_string()]);

        let (result, outcome) = normalize(&df, None).unwrap();
        assert_eq!(values(&result, "c"), vec![0.0, 0.0, 0.0]);
        assert_eq!(outcome.constant_columns, vec!["c".to_string()]);
    }

    #[test]
    fn test_requested_columns_skip_softly() {
        let df = df!(
            "x" => &[1.0f64, 2.0],
            "label" => &["a", "b"],
        )
        .unwrap();
        let requested = vec!["x".to_string(), "label".to_string(), "ghost".to_string()];
        let (result, outcome) = normalize(&df, Some(&requested)).unwrap();

        assert_eq!(outcome.columns, vec!["x".to_string()]);
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(result.column("label").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_default_selects_numeric_only() {
        let df = df!(
            "a" => &[1i64, 2],
            "b" => &[1.5f64, 2.5],
            "s" => &["x", "y"],
        )
        .unwrap();
        let (_, outcome) = standardize(&df, None).unwrap();
        assert_eq!(outcome.columns, vec!["a".to_string(), "b".to_string()]);
        assert!(outcome.skipped.is_empty());
    }
}
