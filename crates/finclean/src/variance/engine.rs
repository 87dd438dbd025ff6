use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ytd::ytd_table;
use crate::audit::{OperationKind, OperationLog, OperationLogEntry};
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::{CleaningError, Result};
use crate::operations::{SuffixMode, join_frames};
use crate::persistence::PersistenceSink;
use crate::pipeline::load_source;
use crate::source::ImportSource;
use crate::types::{JoinKind, SignificanceOutcome, VarianceOutcome};
use crate::utils::{
    column_names, dates_to_series, is_numeric_dtype, is_temporal_dtype, parse_date_string,
    parse_numeric_string, round2, series_of, series_to_f64, series_to_text, temporal_to_dates,
};

/// Budget-versus-actual comparison.
///
/// Import a budget table and an actual table, align them with
/// [`calculate_variances`](Self::calculate_variances), then query the result.
/// Every step is recorded in the engine's own log.
///
/// # Example
///
/// ```rust
/// use finclean::{ImportSource, VarianceEngine};
///
/// let mut engine = VarianceEngine::new();
/// engine.import_budget(ImportSource::csv_text("date,dept,amt\n2024-01-01,A,100\n")).unwrap();
/// engine.import_actual(ImportSource::csv_text("date,dept,amt\n2024-01-01,A,120\n")).unwrap();
///
/// let variances = engine.calculate_variances("date", &["amt"], &["dept"]).unwrap();
/// let pct = variances.column("amt_variance_pct").unwrap();
/// assert_eq!(pct.as_materialized_series().f64().unwrap().get(0), Some(20.0));
/// ```
pub struct VarianceEngine {
    config: PipelineConfig,
    budget: Option<DataFrame>,
    actual: Option<DataFrame>,
    variances: Option<DataFrame>,
    log: OperationLog,
    persistence: Option<Arc<dyn PersistenceSink>>,
}

static_assertions::assert_impl_all!(VarianceEngine: Send);

/// Which side of the comparison a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Budget,
    Actual,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Actual => "actual",
        }
    }
}

/// Log details of a completed step: the outcome plus `status`.
#[derive(Serialize)]
struct Succeeded<'a, T> {
    status: &'static str,
    #[serde(flatten)]
    outcome: &'a T,
}

/// Log details of a failed step.
#[derive(Serialize)]
struct Failed {
    status: &'static str,
    message: String,
}

impl Default for VarianceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VarianceEngine {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            budget: None,
            actual: None,
            variances: None,
            log: OperationLog::new(),
            persistence: None,
        }
    }

    /// Engine with a validated configuration.
    pub fn with_config(config: PipelineConfig) -> std::result::Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Store imported tables through `sink`.
    pub fn with_persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn budget(&self) -> Option<&DataFrame> {
        self.budget.as_ref()
    }

    pub fn actual(&self) -> Option<&DataFrame> {
        self.actual.as_ref()
    }

    /// Result of the last [`calculate_variances`](Self::calculate_variances).
    pub fn variances(&self) -> Option<&DataFrame> {
        self.variances.as_ref()
    }

    pub fn log(&self) -> &[OperationLogEntry] {
        self.log.entries()
    }

    pub fn log_json(&self) -> Result<String> {
        Ok(self.log.to_json()?)
    }

    /// Import the budget table. Any computed variances are discarded.
    pub fn import_budget(&mut self, source: ImportSource) -> Result<&DataFrame> {
        let table = self.import(source, Role::Budget)?;
        Ok(self.budget.insert(table))
    }

    /// Import the actual table. Any computed variances are discarded.
    pub fn import_actual(&mut self, source: ImportSource) -> Result<&DataFrame> {
        let table = self.import(source, Role::Actual)?;
        Ok(self.actual.insert(table))
    }

    fn import(&mut self, source: ImportSource, role: Role) -> Result<DataFrame> {
        let loaded = load_source(source, &self.config, self.persistence.as_deref()).map(
            |(table, mut outcome)| {
                outcome.role = Some(role.as_str().to_string());
                (table, outcome)
            },
        );
        let table = self.logged(OperationKind::ImportData, loaded)?;
        self.variances = None;
        info!("Imported {} table: {:?}", role.as_str(), table.shape());
        Ok(table)
    }

    /// Align budget and actual on `[date] + categories` and compute, for each
    /// amount column `c`, `c_variance` and `c_variance_pct`.
    ///
    /// Rows without a match on both sides are dropped (inner join). A zero
    /// budget leaves the percentage null.
    pub fn calculate_variances<A, C>(
        &mut self,
        date_column: &str,
        amount_columns: &[A],
        category_columns: &[C],
    ) -> Result<&DataFrame>
    where
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let amounts = to_strings(amount_columns);
        let categories = to_strings(category_columns);
        let computed = self.variance_table(date_column, &amounts, &categories);
        let table = self.logged(OperationKind::CalculateVariances, computed)?;

        info!(
            "Variances calculated: {} matched rows, {} amount columns",
            table.height(),
            amounts.len()
        );
        Ok(self.variances.insert(table))
    }

    fn variance_table(
        &self,
        date_column: &str,
        amounts: &[String],
        categories: &[String],
    ) -> Result<(DataFrame, VarianceOutcome)> {
        let (Some(budget), Some(actual)) = (&self.budget, &self.actual) else {
            return Err(CleaningError::State(
                "both budget and actual data must be imported first".to_string(),
            ));
        };
        let (budget_suffix, actual_suffix) = &self.config.variance_suffixes;
        compute_variances(
            budget,
            actual,
            date_column,
            amounts,
            categories,
            (budget_suffix.as_str(), actual_suffix.as_str()),
        )
    }

    /// Rows where any selected `*_variance_pct` column reaches the threshold
    /// in absolute value. Nulls never qualify.
    ///
    /// `threshold_pct` defaults to the configured threshold, `columns` to
    /// every variance-percentage column.
    pub fn significant_variances(
        &mut self,
        threshold_pct: Option<f64>,
        columns: Option<&[String]>,
    ) -> Result<DataFrame> {
        let selected = self.significant_rows(threshold_pct, columns);
        self.logged(OperationKind::GetSignificantVariances, selected)
    }

    fn significant_rows(
        &self,
        threshold_pct: Option<f64>,
        columns: Option<&[String]>,
    ) -> Result<(DataFrame, SignificanceOutcome)> {
        let variances = self.require_variances()?;
        let threshold = threshold_pct.unwrap_or(self.config.significance_threshold_pct);

        let columns = match columns {
            Some(names) => names.to_vec(),
            None => column_names(variances)
                .into_iter()
                .filter(|name| name.ends_with("_variance_pct"))
                .collect(),
        };

        let mut mask = vec![false; variances.height()];
        for name in &columns {
            let series = series_of(variances, name).map_err(|_| {
                CleaningError::Schema(format!("variance column '{name}' not found"))
            })?;
            if !is_numeric_dtype(series.dtype()) {
                return Err(CleaningError::Schema(format!(
                    "variance column '{name}' is not numeric ({})",
                    series.dtype()
                )));
            }
            for (flag, value) in mask.iter_mut().zip(series_to_f64(&series)?) {
                if value.is_some_and(|v| v.abs() >= threshold) {
                    *flag = true;
                }
            }
        }

        let mask = BooleanChunked::from_slice(PlSmallStr::from_static("mask"), &mask);
        let significant = variances.filter(&mask)?;
        debug!(
            "{} of {} rows at or above {}%",
            significant.height(),
            variances.height(),
            threshold
        );

        let outcome = SignificanceOutcome {
            threshold,
            columns,
            count: significant.height(),
        };
        Ok((significant, outcome))
    }

    /// Yearly totals per category with the percentage recomputed from the
    /// sums.
    pub fn ytd_performance<A, C>(
        &mut self,
        date_column: &str,
        amount_columns: &[A],
        category_columns: &[C],
    ) -> Result<DataFrame>
    where
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let amounts = to_strings(amount_columns);
        let categories = to_strings(category_columns);
        let (budget_suffix, actual_suffix) = &self.config.variance_suffixes;
        let rolled = self.require_variances().and_then(|variances| {
            ytd_table(
                variances,
                date_column,
                &amounts,
                &categories,
                (budget_suffix.as_str(), actual_suffix.as_str()),
            )
        });
        self.logged(OperationKind::CalculateYtdPerformance, rolled)
    }

    /// Record `result` under `operation` and pass it on. A failure is logged
    /// as `{"status": "error", "message": ...}` before it propagates.
    fn logged<T, O: Serialize>(
        &mut self,
        operation: OperationKind,
        result: Result<(T, O)>,
    ) -> Result<T> {
        match result {
            Ok((value, outcome)) => {
                self.log.record(
                    operation,
                    &Succeeded {
                        status: "success",
                        outcome: &outcome,
                    },
                );
                Ok(value)
            }
            Err(err) => {
                warn!("{} failed: {}", operation, err);
                self.log.record(
                    operation,
                    &Failed {
                        status: "error",
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    fn require_variances(&self) -> Result<&DataFrame> {
        self.variances.as_ref().ok_or_else(|| {
            CleaningError::State("variances have not been calculated yet".to_string())
        })
    }
}

fn to_strings<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|s| s.as_ref().to_string()).collect()
}

/// Join budget and actual and derive the variance columns.
pub(crate) fn compute_variances(
    budget: &DataFrame,
    actual: &DataFrame,
    date_column: &str,
    amounts: &[String],
    categories: &[String],
    (budget_suffix, actual_suffix): (&str, &str),
) -> Result<(DataFrame, VarianceOutcome)> {
    if amounts.is_empty() {
        return Err(CleaningError::Schema(
            "at least one amount column is required".to_string(),
        ));
    }

    let mut keys = vec![date_column.to_string()];
    keys.extend(categories.iter().cloned());

    for (role, df) in [(Role::Budget, budget), (Role::Actual, actual)] {
        let missing: Vec<&str> = keys
            .iter()
            .chain(amounts)
            .filter(|name| df.column(name).is_err())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CleaningError::Schema(format!(
                "{} table is missing columns: {}",
                role.as_str(),
                missing.join(", ")
            )));
        }
    }

    let budget = prepare_side(budget, date_column, amounts, Role::Budget)?;
    let actual = prepare_side(actual, date_column, amounts, Role::Actual)?;

    let (mut merged, _) = join_frames(
        &budget,
        &actual,
        &keys,
        JoinKind::Inner,
        (budget_suffix, actual_suffix),
        SuffixMode::All,
    )?;

    let mut undefined_pct = BTreeMap::new();
    for amount in amounts {
        let budget_values = series_to_f64(&series_of(&merged, &format!("{amount}{budget_suffix}"))?)?;
        let actual_values = series_to_f64(&series_of(&merged, &format!("{amount}{actual_suffix}"))?)?;

        let mut variance = Vec::with_capacity(merged.height());
        let mut pct = Vec::with_capacity(merged.height());
        let mut zero_budget = 0usize;
        for (b, a) in budget_values.iter().zip(&actual_values) {
            let diff = match (b, a) {
                (Some(b), Some(a)) => Some(a - b),
                _ => None,
            };
            variance.push(diff);
            pct.push(match (b, diff) {
                (Some(b), Some(_)) if *b == 0.0 => {
                    zero_budget += 1;
                    None
                }
                (Some(b), Some(d)) => Some(round2(100.0 * d / b.abs())),
                _ => None,
            });
        }

        let pct_name = format!("{amount}_variance_pct");
        merged.with_column(Series::new(format!("{amount}_variance").into(), variance))?;
        merged.with_column(Series::new(pct_name.as_str().into(), pct))?;
        if zero_budget > 0 {
            debug!("{} rows with zero budget in '{}'", zero_budget, amount);
        }
        undefined_pct.insert(pct_name, zero_budget);
    }

    let outcome = VarianceOutcome {
        merge_columns: keys,
        amount_columns: amounts.to_vec(),
        resulting_shape: merged.shape(),
        undefined_pct,
    };
    Ok((merged, outcome))
}

/// Date column to `Date`, amount columns to `Float64`.
fn prepare_side(df: &DataFrame, date_column: &str, amounts: &[String], role: Role) -> Result<DataFrame> {
    let mut df = df.clone();
    let dates = coerce_dates(&series_of(&df, date_column)?, role)?;
    df.replace(date_column, dates)?;

    for amount in amounts {
        let series = series_of(&df, amount)?;
        let floats = if is_numeric_dtype(series.dtype()) {
            series.cast(&DataType::Float64)?
        } else {
            let mut values = Vec::with_capacity(series.len());
            for text in series_to_text(&series)? {
                match text {
                    None => values.push(None),
                    Some(raw) => match parse_numeric_string(&raw) {
                        Some(v) => values.push(Some(v)),
                        None => {
                            return Err(CleaningError::type_error(
                                amount,
                                format!("'{raw}' in the {} table is not a number", role.as_str()),
                            ));
                        }
                    },
                }
            }
            Series::new(amount.as_str().into(), values)
        };
        df.replace(amount, floats)?;
    }
    Ok(df)
}

fn coerce_dates(series: &Series, role: Role) -> Result<Series> {
    let name = series.name().to_string();
    let dates: Vec<Option<NaiveDate>> = if is_temporal_dtype(series.dtype()) {
        temporal_to_dates(series)?
    } else {
        let mut dates = Vec::with_capacity(series.len());
        for text in series_to_text(series)? {
            match text {
                None => dates.push(None),
                Some(raw) => match parse_date_string(&raw) {
                    Some(date) => dates.push(Some(date)),
                    None => {
                        return Err(CleaningError::type_error(
                            &name,
                            format!("'{raw}' in the {} table is not a date", role.as_str()),
                        ));
                    }
                },
            }
        }
        dates
    };
    Ok(dates_to_series(&name, &dates)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const BUDGET: &str = "date,dept,amt\n2024-01-01,A,100\n2024-01-01,B,0\n2024-02-01,A,200\n";
    const ACTUAL: &str = "date,dept,amt\n2024-01-01,A,120\n2024-01-01,B,50\n2024-03-01,A,10\n";

    fn engine() -> VarianceEngine {
        let mut engine = VarianceEngine::new();
        engine.import_budget(ImportSource::csv_text(BUDGET)).unwrap();
        engine.import_actual(ImportSource::csv_text(ACTUAL)).unwrap();
        engine
    }

    fn f64_column(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        series_to_f64(&series_of(df, name).unwrap()).unwrap()
    }

    #[test]
    fn test_basic_variance() {
        let mut engine = engine();
        let result = engine.calculate_variances("date", &["amt"], &["dept"]).unwrap();

        assert_eq!(result.height(), 2);
        assert_eq!(
            column_names(result),
            vec![
                "date",
                "dept",
                "amt_budget",
                "amt_actual",
                "amt_variance",
                "amt_variance_pct"
            ]
        );
        assert_eq!(result.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(f64_column(result, "amt_variance"), vec![Some(20.0), Some(50.0)]);
        assert_eq!(f64_column(result, "amt_variance_pct"), vec![Some(20.0), None]);
    }

    #[test]
    fn test_zero_budget_counted_in_log() {
        let mut engine = engine();
        engine.calculate_variances("date", &["amt"], &["dept"]).unwrap();

        let entry = engine.log().last().unwrap();
        assert_eq!(entry.operation, OperationKind::CalculateVariances);
        assert_eq!(entry.details["undefined_pct"], json!({"amt_variance_pct": 1}));
        assert_eq!(entry.details["merge_columns"], json!(["date", "dept"]));
        assert_eq!(entry.details["status"], json!("success"));
    }

    #[test]
    fn test_requires_both_tables() {
        let mut engine = VarianceEngine::new();
        engine.import_budget(ImportSource::csv_text(BUDGET)).unwrap();
        let err = engine
            .calculate_variances("date", &["amt"], &["dept"])
            .unwrap_err();
        assert_eq!(err.error_code(), "STATE_ERROR");

        let err = engine.significant_variances(None, None).unwrap_err();
        assert_eq!(err.error_code(), "STATE_ERROR");
    }

    #[test]
    fn test_missing_columns_are_schema_errors() {
        let mut engine = engine();
        let err = engine
            .calculate_variances("date", &["cost"], &["dept"])
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert!(err.to_string().contains("cost"));
    }

    #[test]
    fn test_unparseable_date_is_type_error() {
        let mut engine = VarianceEngine::new();
        engine
            .import_budget(ImportSource::csv_text("date,amt\nsoon,1\n"))
            .unwrap();
        engine
            .import_actual(ImportSource::csv_text("date,amt\n2024-01-01,1\n"))
            .unwrap();
        let err = engine
            .calculate_variances("date", &["amt"], &[] as &[&str])
            .unwrap_err();
        assert_eq!(err.error_code(), "TYPE_ERROR");

        assert_eq!(engine.log().len(), 3);
        let entry = engine.log().last().unwrap();
        assert_eq!(entry.operation, OperationKind::CalculateVariances);
        assert_eq!(entry.details["status"], json!("error"));
        assert_eq!(entry.details["message"], json!(err.to_string()));
        assert!(engine.variances().is_none());
    }

    #[test]
    fn test_failed_steps_are_logged() {
        let mut engine = VarianceEngine::new();
        engine
            .import_budget(ImportSource::csv_text("date,amt
2024-01-01,1
"))
            .unwrap();
        engine
            .import_actual(ImportSource::csv_path("no/such/actual.csv"))
            .unwrap_err();
        engine.significant_variances(None, None).unwrap_err();
        engine
            .ytd_performance("date", &["amt"], &[] as &[&str])
            .unwrap_err();

        let statuses: Vec<_> = engine
            .log()
            .iter()
            .map(|e| (e.operation, e.details["status"].clone()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (OperationKind::ImportData, json!("success")),
                (OperationKind::ImportData, json!("error")),
                (OperationKind::GetSignificantVariances, json!("error")),
                (OperationKind::CalculateYtdPerformance, json!("error")),
            ]
        );
    }

    #[test]
    fn test_mixed_date_spellings_align() {
        let mut engine = VarianceEngine::new();
        engine
            .import_budget(ImportSource::csv_text("date,amt\n2024-01,100\n"))
            .unwrap();
        engine
            .import_actual(ImportSource::csv_text("date,amt\n2024/01/01,90\n"))
            .unwrap();
        let result = engine
            .calculate_variances("date", &["amt"], &[] as &[&str])
            .unwrap();
        assert_eq!(f64_column(result, "amt_variance_pct"), vec![Some(-10.0)]);
    }

    #[test]
    fn test_significant_variances_or_semantics() {
        let budget = "date,a,b\n2024-01-01,100,100\n2024-01-02,100,100\n2024-01-03,100,100\n";
        let actual = "date,a,b\n2024-01-01,101,150\n2024-01-02,102,101\n2024-01-03,130,100\n";
        let mut engine = VarianceEngine::new();
        engine.import_budget(ImportSource::csv_text(budget)).unwrap();
        engine.import_actual(ImportSource::csv_text(actual)).unwrap();
        engine
            .calculate_variances("date", &["a", "b"], &[] as &[&str])
            .unwrap();

        let significant = engine.significant_variances(Some(5.0), None).unwrap();
        assert_eq!(significant.height(), 2);

        let only_a = vec!["a_variance_pct".to_string()];
        let significant = engine.significant_variances(Some(5.0), Some(&only_a)).unwrap();
        assert_eq!(significant.height(), 1);

        let entry = engine.log().last().unwrap();
        assert_eq!(entry.details["count"], json!(1));
        assert_eq!(entry.details["threshold"], json!(5.0));
    }

    #[test]
    fn test_significant_unknown_column() {
        let mut engine = engine();
        engine.calculate_variances("date", &["amt"], &["dept"]).unwrap();
        let ghost = vec!["ghost_variance_pct".to_string()];
        let err = engine.significant_variances(None, Some(&ghost)).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_reimport_discards_variances() {
        let mut engine = engine();
        engine.calculate_variances("date", &["amt"], &["dept"]).unwrap();
        assert!(engine.variances().is_some());

        engine.import_actual(ImportSource::csv_text(ACTUAL)).unwrap();
        assert!(engine.variances().is_none());

        let roles: Vec<_> = engine
            .log()
            .iter()
            .filter_map(|e| e.details.get("role").cloned())
            .collect();
        assert_eq!(roles, vec![json!("budget"), json!("actual"), json!("actual")]);
    }
}
