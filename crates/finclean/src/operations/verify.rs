//! Rule-based verification and enrichment.
//!
//! Each [`ColumnRule`] is applied on its own: coerce the column to the
//! declared type, measure how much of it falls inside a range, and derive a
//! new column from it.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{
    ColumnRule, Derivation, ExpectedType, RuleSummary, SkippedColumn, VerificationOutcome,
};
use crate::utils::{
    datetimes_to_series, is_numeric_dtype, is_temporal_dtype, parse_datetime_string,
    parse_numeric_string, series_of, series_to_f64, series_to_text,
};

/// Apply verification rules to a table.
pub fn verify_and_enrich(
    df: &DataFrame,
    rules: &[ColumnRule],
) -> Result<(DataFrame, VerificationOutcome)> {
    let mut result = df.clone();
    let mut outcome = VerificationOutcome {
        rules_applied: rules.iter().map(RuleSummary::from).collect(),
        verification_results: BTreeMap::new(),
        coercion_failures: BTreeMap::new(),
        derived_columns: Vec::new(),
        derivation_errors: Vec::new(),
        skipped: Vec::new(),
    };

    for rule in rules {
        let column = rule.column.as_str();
        if result.column(column).is_err() {
            warn!("Rule skipped: column '{}' not found", column);
            outcome
                .skipped
                .push(SkippedColumn::new(column, "column not found"));
            continue;
        }

        if let Some(expected) = rule.expected_type {
            let series = series_of(&result, column)?;
            let (coerced, failures) = coerce(&series, expected)?;
            if failures > 0 {
                warn!(
                    "{} values in '{}' could not be read as {:?}",
                    failures, column, expected
                );
            }
            outcome.coercion_failures.insert(column.to_string(), failures);
            result.replace(column, coerced)?;
        }

        let series = series_of(&result, column)?;
        let numeric = is_numeric_dtype(series.dtype());

        if let Some((min, max)) = rule.range {
            if numeric {
                let fraction = in_range_fraction(&series_to_f64(&series)?, min, max);
                debug!("'{}' in [{}, {}]: {:?}", column, min, max, fraction);
                outcome
                    .verification_results
                    .insert(format!("{column}_in_range"), fraction);
            } else {
                warn!("Range check on non-numeric column '{}' skipped", column);
                outcome.skipped.push(SkippedColumn::new(
                    column,
                    format!("range check requires a numeric column, found {}", series.dtype()),
                ));
            }
        }

        if let Some(derived) = &rule.derived {
            if !numeric {
                let reason = format!(
                    "derivation '{}' requires a numeric column, found {}",
                    derived.derivation.name(),
                    series.dtype()
                );
                warn!("Derivation of '{}' failed: {}", derived.name, reason);
                outcome
                    .derivation_errors
                    .push(SkippedColumn::new(&derived.name, reason));
                continue;
            }

            match apply_derivation(&series_to_f64(&series)?, &derived.derivation) {
                Ok(values) => {
                    result.with_column(Series::new(derived.name.as_str().into(), values))?;
                    debug!("Derived '{}' from '{}'", derived.name, column);
                    outcome.derived_columns.push(derived.name.clone());
                }
                Err(reason) => {
                    warn!("Derivation of '{}' failed: {}", derived.name, reason);
                    outcome
                        .derivation_errors
                        .push(SkippedColumn::new(&derived.name, reason));
                }
            }
        }
    }

    Ok((result, outcome))
}

/// Coerce a series to the expected type. Returns the new series and how many
/// non-null values became null.
fn coerce(series: &Series, expected: ExpectedType) -> Result<(Series, usize)> {
    let before = series.null_count();
    let coerced = match expected {
        ExpectedType::Numeric if is_numeric_dtype(series.dtype()) => series.clone(),
        ExpectedType::Numeric => {
            let values: Vec<Option<f64>> = series_to_text(series)?
                .iter()
                .map(|v| v.as_deref().and_then(parse_numeric_string))
                .collect();
            Series::new(series.name().clone(), values)
        }
        ExpectedType::Temporal if is_temporal_dtype(series.dtype()) => series.clone(),
        ExpectedType::Temporal => {
            let values: Vec<Option<NaiveDateTime>> = series_to_text(series)?
                .iter()
                .map(|v| v.as_deref().and_then(parse_datetime_string))
                .collect();
            datetimes_to_series(series.name().as_str(), &values)?
        }
    };
    let failures = coerced.null_count().saturating_sub(before);
    Ok((coerced, failures))
}

/// Share of non-null values inside `[min, max]`; `None` without values.
fn in_range_fraction(values: &[Option<f64>], min: f64, max: f64) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    let inside = present.iter().filter(|v| (min..=max).contains(*v)).count();
    Some(inside as f64 / present.len() as f64)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Evaluate a derivation element-wise. Non-finite results become null.
pub(crate) fn apply_derivation(
    values: &[Option<f64>],
    derivation: &Derivation,
) -> std::result::Result<Vec<Option<f64>>, String> {
    let map = |f: &dyn Fn(f64) -> Option<f64>| -> Vec<Option<f64>> {
        values
            .iter()
            .map(|v| v.and_then(f).and_then(finite))
            .collect()
    };

    let derived = match derivation {
        Derivation::Square => map(&|x| Some(x * x)),
        Derivation::Sqrt => map(&|x| (x >= 0.0).then(|| x.sqrt())),
        Derivation::Abs => map(&|x| Some(x.abs())),
        Derivation::Negate => map(&|x| Some(-x)),
        Derivation::Log => map(&|x| (x > 0.0).then(|| x.ln())),
        Derivation::Ratio(divisor) => {
            if *divisor == 0.0 || !divisor.is_finite() {
                return Err(format!("ratio divisor must be non-zero, got {divisor}"));
            }
            map(&|x| Some(x / divisor))
        }
        Derivation::Scale(factor) => map(&|x| Some(x * factor)),
        Derivation::Offset(offset) => map(&|x| Some(x + offset)),
        Derivation::Delta => pairwise(values, |prev, cur| Some(cur - prev)),
        Derivation::PercentChange => pairwise(values, |prev, cur| {
            (prev != 0.0).then(|| 100.0 * (cur - prev) / prev.abs())
        }),
        Derivation::Custom(f) => map(&|x| (f.0)(x)),
    };

    Ok(derived)
}

/// `f(x[i-1], x[i])`; the first row and rows next to a null are null.
fn pairwise(values: &[Option<f64>], f: impl Fn(f64, f64) -> Option<f64>) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for (idx, current) in values.iter().enumerate() {
        let value = match (idx, prev, current) {
            (0, _, _) => None,
            (_, Some(p), Some(c)) => f(p, *c).and_then(finite),
            _ => None,
        };
        out.push(value);
        prev = *current;
    }
    out
}
