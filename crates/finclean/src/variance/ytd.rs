//! Year-to-date roll-up of a variance table.
//!
//! Sums are taken first and the percentage is recomputed from the sums, so
//! the result is never an average of per-row percentages.

use chrono::Datelike;
use polars::prelude::*;
use tracing::debug;

use crate::error::{CleaningError, Result};
use crate::types::YtdOutcome;
use crate::utils::{round2, series_of, series_to_f64, temporal_to_dates};

const YEAR: &str = "year";

/// Group `variances` by categories and calendar year of `date_column`.
///
/// Output columns: the categories, `year`, then per amount column `c` the
/// summed `c{budget}`, `c{actual}`, `c_variance` and `c_ytd_pct`. Rows are
/// sorted by the typed category values, then year, nulls first. Nulls count
/// as zero in the sums; rows without a date are left out.
pub(crate) fn ytd_table(
    variances: &DataFrame,
    date_column: &str,
    amounts: &[String],
    categories: &[String],
    (budget_suffix, actual_suffix): (&str, &str),
) -> Result<(DataFrame, YtdOutcome)> {
    if categories.iter().any(|c| c == YEAR) {
        return Err(CleaningError::Schema(format!(
            "'{YEAR}' is the output year column and cannot be a category"
        )));
    }

    let mut summed: Vec<String> = Vec::with_capacity(amounts.len() * 3);
    for amount in amounts {
        summed.push(format!("{amount}{budget_suffix}"));
        summed.push(format!("{amount}{actual_suffix}"));
        summed.push(format!("{amount}_variance"));
    }
    let mut required: Vec<String> = vec![date_column.to_string()];
    required.extend(categories.iter().cloned());
    required.extend(summed.iter().cloned());
    let missing: Vec<&str> = required
        .iter()
        .filter(|name| variances.column(name).is_err())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(CleaningError::Schema(format!(
            "variance table is missing columns: {}",
            missing.join(", ")
        )));
    }

    let dates = temporal_to_dates(&series_of(variances, date_column)?).map_err(|_| {
        CleaningError::type_error(date_column, "year-to-date grouping needs a date column")
    })?;
    let years: Vec<Option<i32>> = dates.iter().map(|d| d.map(|d| d.year())).collect();

    let mut frame = variances.select(categories.iter().chain(&summed).map(String::as_str))?;
    frame.with_column(Series::new(YEAR.into(), years))?;

    let mut keys: Vec<Expr> = categories.iter().map(|c| col(c.as_str())).collect();
    keys.push(col(YEAR));
    let sums: Vec<Expr> = summed
        .iter()
        .map(|name| {
            col(name.as_str())
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .sum()
        })
        .collect();

    let mut table = frame
        .lazy()
        .filter(col(YEAR).is_not_null())
        .group_by(keys.clone())
        .agg(sums)
        .sort_by_exprs(keys, SortMultipleOptions::default())
        .collect()?;

    let mut order: Vec<String> = categories.to_vec();
    order.push(YEAR.to_string());
    for amount in amounts {
        let budget = series_to_f64(&series_of(&table, &format!("{amount}{budget_suffix}"))?)?;
        let variance = series_to_f64(&series_of(&table, &format!("{amount}_variance"))?)?;
        let pct: Vec<Option<f64>> = budget
            .iter()
            .zip(&variance)
            .map(|(b, v)| {
                let b = b.unwrap_or(0.0);
                (b != 0.0).then(|| round2(100.0 * v.unwrap_or(0.0) / b.abs()))
            })
            .collect();
        let pct_name = format!("{amount}_ytd_pct");
        table.with_column(Series::new(pct_name.as_str().into(), pct))?;

        order.push(format!("{amount}{budget_suffix}"));
        order.push(format!("{amount}{actual_suffix}"));
        order.push(format!("{amount}_variance"));
        order.push(pct_name);
    }
    let table = table.select(order)?;
    debug!("Year-to-date table: {} groups", table.height());

    let mut group_columns = categories.to_vec();
    group_columns.push(YEAR.to_string());
    let outcome = YtdOutcome {
        group_columns,
        amount_columns: amounts.to_vec(),
        groups: table.height(),
    };
    Ok((table, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ImportSource;
    use crate::utils::column_names;
    use crate::variance::VarianceEngine;
    use pretty_assertions::assert_eq;

    fn values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        series_to_f64(&series_of(df, name).unwrap()).unwrap()
    }

    fn engine() -> VarianceEngine {
        let budget = "date,dept,amt\n\
                      2024-01-01,B,100\n\
                      2024-02-01,B,100\n\
                      2024-01-01,A,0\n\
                      2023-12-01,A,50\n";
        let actual = "date,dept,amt\n\
                      2024-01-01,B,90\n\
                      2024-02-01,B,130\n\
                      2024-01-01,A,10\n\
                      2023-12-01,A,40\n";
        let mut engine = VarianceEngine::new();
        engine.import_budget(ImportSource::csv_text(budget)).unwrap();
        engine.import_actual(ImportSource::csv_text(actual)).unwrap();
        engine
            .calculate_variances("date", &["amt"], &["dept"])
            .unwrap();
        engine
    }

    #[test]
    fn test_sum_then_ratio_sorted_by_group() {
        let mut engine = engine();
        let ytd = engine.ytd_performance("date", &["amt"], &["dept"]).unwrap();

        assert_eq!(
            column_names(&ytd),
            vec![
                "dept",
                "year",
                "amt_budget",
                "amt_actual",
                "amt_variance",
                "amt_ytd_pct"
            ]
        );
        assert_eq!(ytd.height(), 3);

        let years: Vec<Option<i32>> = ytd
            .column("year")
            .unwrap()
            .as_materialized_series()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(years, vec![Some(2023), Some(2024), Some(2024)]);

        assert_eq!(
            values(&ytd, "amt_budget"),
            vec![Some(50.0), Some(0.0), Some(200.0)]
        );
        assert_eq!(
            values(&ytd, "amt_variance"),
            vec![Some(-10.0), Some(10.0), Some(20.0)]
        );
        assert_eq!(
            values(&ytd, "amt_ytd_pct"),
            vec![Some(-20.0), None, Some(10.0)]
        );
    }

    #[test]
    fn test_numeric_categories_sort_by_value() {
        let budget = "date,cc,amt\n\
                      2024-01-01,10,1\n\
                      2024-01-01,2,2\n\
                      2024-01-01,9,3\n";
        let actual = "date,cc,amt\n\
                      2024-01-01,10,1\n\
                      2024-01-01,2,2\n\
                      2024-01-01,9,3\n";
        let mut engine = VarianceEngine::new();
        engine.import_budget(ImportSource::csv_text(budget)).unwrap();
        engine.import_actual(ImportSource::csv_text(actual)).unwrap();
        engine
            .calculate_variances("date", &["amt"], &["cc"])
            .unwrap();

        let ytd = engine.ytd_performance("date", &["amt"], &["cc"]).unwrap();
        let codes = values(&ytd, "cc");
        assert_eq!(codes, vec![Some(2.0), Some(9.0), Some(10.0)]);
        assert_eq!(
            values(&ytd, "amt_budget"),
            vec![Some(2.0), Some(3.0), Some(1.0)]
        );
    }

    #[test]
    fn test_requires_variances_and_known_columns() {
        let mut fresh = VarianceEngine::new();
        let err = fresh
            .ytd_performance("date", &["amt"], &["dept"])
            .unwrap_err();
        assert_eq!(err.error_code(), "STATE_ERROR");

        let mut engine = engine();
        let err = engine
            .ytd_performance("date", &["cost"], &["dept"])
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_logged_with_group_columns() {
        let mut engine = engine();
        engine
            .ytd_performance("date", &["amt"], &[] as &[&str])
            .unwrap();
        let entry = engine.log().last().unwrap();
        assert_eq!(entry.details["group_columns"], serde_json::json!(["year"]));
        assert_eq!(entry.details["groups"], serde_json::json!(2));
    }
}
