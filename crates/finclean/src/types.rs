use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Operation parameters
// =============================================================================

/// Which columns an operation should touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSelection {
    /// Every eligible column (all numeric columns for scaling, the whole row
    /// for deduplication).
    #[default]
    All,
    /// Exactly these columns.
    Named(Vec<String>),
}

impl ColumnSelection {
    pub fn all() -> Self {
        Self::All
    }

    pub fn named<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(columns.into_iter().map(Into::into).collect())
    }

    /// The named columns, or `None` for [`ColumnSelection::All`].
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Self::All => None,
            Self::Named(names) => Some(names),
        }
    }
}

impl From<Option<Vec<String>>> for ColumnSelection {
    fn from(columns: Option<Vec<String>>) -> Self {
        match columns {
            Some(names) => Self::Named(names),
            None => Self::All,
        }
    }
}

/// Strategy used by `rebuild_missing_data` for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationMethod {
    Mean,
    Median,
    Mode,
    ForwardFill,
    BackwardFill,
}

impl ImputationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::ForwardFill => "forward_fill",
            Self::BackwardFill => "backward_fill",
        }
    }

    /// Mean and median only make sense over numbers.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, Self::Mean | Self::Median)
    }
}

impl fmt::Display for ImputationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImputationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "mode" => Ok(Self::Mode),
            "forward_fill" | "ffill" => Ok(Self::ForwardFill),
            "backward_fill" | "bfill" => Ok(Self::BackwardFill),
            other => Err(format!("unsupported imputation method '{other}'")),
        }
    }
}

/// Which member of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    #[default]
    First,
    Last,
}

impl KeepStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

impl FromStr for KeepStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(format!("unsupported keep strategy '{other}'")),
        }
    }
}

/// Join kind for `merge_datasets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Left,
    Right,
    Inner,
    Outer,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Inner => "inner",
            Self::Outer => "outer",
        }
    }
}

impl FromStr for JoinKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "inner" => Ok(Self::Inner),
            "outer" | "full" => Ok(Self::Outer),
            other => Err(format!("unsupported join kind '{other}'")),
        }
    }
}

// =============================================================================
// Verification rules
// =============================================================================

/// Type a [`ColumnRule`] coerces its column to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedType {
    Numeric,
    #[serde(alias = "datetime", alias = "date")]
    Temporal,
}

/// Typed function value for [`Derivation::Custom`].
#[derive(Clone)]
pub struct DerivationFn(pub Arc<dyn Fn(f64) -> Option<f64> + Send + Sync>);

impl DerivationFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(f64) -> Option<f64> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for DerivationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivationFn(..)")
    }
}

/// Pre-vetted element-wise derivations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Derivation {
    Square,
    Sqrt,
    Abs,
    Negate,
    /// Natural log; non-positive inputs become null.
    Log,
    /// `x / divisor`.
    Ratio(f64),
    /// `x * factor`.
    Scale(f64),
    /// `x + offset`.
    Offset(f64),
    /// `x[i] - x[i-1]`; the first row is null.
    Delta,
    /// `100 * (x[i] - x[i-1]) / |x[i-1]|`; a zero predecessor gives null.
    PercentChange,
    /// Caller-supplied function. Cannot be serialized.
    #[serde(skip)]
    Custom(DerivationFn),
}

impl Derivation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Negate => "negate",
            Self::Log => "log",
            Self::Ratio(_) => "ratio",
            Self::Scale(_) => "scale",
            Self::Offset(_) => "offset",
            Self::Delta => "delta",
            Self::PercentChange => "percent_change",
            Self::Custom(_) => "custom",
        }
    }
}

/// New column computed from a rule's target column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub derivation: Derivation,
}

/// Declarative verification/enrichment rule for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column: String,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<ExpectedType>,
    /// Inclusive `[min, max]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedColumn>,
}

impl ColumnRule {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            expected_type: None,
            range: None,
            derived: None,
        }
    }

    pub fn expect(mut self, expected: ExpectedType) -> Self {
        self.expected_type = Some(expected);
        self
    }

    pub fn within(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn derive(mut self, name: impl Into<String>, derivation: Derivation) -> Self {
        self.derived = Some(DerivedColumn {
            name: name.into(),
            derivation,
        });
        self
    }
}

// =============================================================================
// Export
// =============================================================================

/// Output formats supported by `Pipeline::export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Table,
    CsvText,
    JsonText,
    RecordList,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::CsvText => "csv",
            Self::JsonText => "json",
            Self::RecordList => "records",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" | "dataframe" => Ok(Self::Table),
            "csv" | "csv-text" => Ok(Self::CsvText),
            "json" | "json-text" => Ok(Self::JsonText),
            "records" | "record-list" | "dict" => Ok(Self::RecordList),
            other => Err(format!("unsupported export format '{other}'")),
        }
    }
}

/// One exported row, column name to JSON value.
pub type Record = Map<String, Value>;

/// Result of `Pipeline::export`.
#[derive(Debug, Clone)]
pub enum ExportOutput {
    Table(DataFrame),
    CsvText(String),
    JsonText(String),
    RecordList(Vec<Record>),
}

impl ExportOutput {
    pub fn into_table(self) -> Option<DataFrame> {
        match self {
            Self::Table(df) => Some(df),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::CsvText(text) | Self::JsonText(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Self::RecordList(records) => Some(records),
            _ => None,
        }
    }
}

// =============================================================================
// Operation outcomes (serialized into log entry details)
// =============================================================================

/// Column that an operation skipped instead of failing on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedColumn {
    pub column: String,
    pub reason: String,
}

impl SkippedColumn {
    pub fn new(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub format_type: String,
    pub source: String,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub rows_dropped: usize,
    pub columns_dropped: Vec<String>,
    pub numeric_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationOutcome {
    /// Column to method name, in request order.
    pub methods_applied: Vec<(String, String)>,
    pub skipped: Vec<SkippedColumn>,
    pub missing_values_remaining: BTreeMap<String, usize>,
}

/// Affine parameters of a scaling step: `scaled = (x - offset) / scale`.
///
/// Recorded per column so the transform can be replayed or inverted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParameters {
    pub offset: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingOutcome {
    pub columns: Vec<String>,
    pub skipped: Vec<SkippedColumn>,
    pub constant_columns: Vec<String>,
    pub parameters: BTreeMap<String, ScaleParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub columns_considered: Option<Vec<String>>,
    pub keep_strategy: KeepStrategy,
    pub rows_removed: usize,
}

/// Loggable view of a [`ColumnRule`]; custom derivations are named, not
/// serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSummary {
    pub column: String,
    pub expected_type: Option<ExpectedType>,
    pub range: Option<(f64, f64)>,
    pub derived_column: Option<String>,
    pub derivation: Option<String>,
}

impl From<&ColumnRule> for RuleSummary {
    fn from(rule: &ColumnRule) -> Self {
        Self {
            column: rule.column.clone(),
            expected_type: rule.expected_type,
            range: rule.range,
            derived_column: rule.derived.as_ref().map(|d| d.name.clone()),
            derivation: rule.derived.as_ref().map(|d| d.derivation.name().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub rules_applied: Vec<RuleSummary>,
    /// `{column}_in_range` to the fraction of non-null values inside the range.
    pub verification_results: BTreeMap<String, Option<f64>>,
    pub coercion_failures: BTreeMap<String, usize>,
    pub derived_columns: Vec<String>,
    pub derivation_errors: Vec<SkippedColumn>,
    pub skipped: Vec<SkippedColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub merge_columns: Vec<String>,
    pub merge_type: JoinKind,
    pub renamed_columns: Vec<(String, String)>,
    pub resulting_shape: (usize, usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub format_type: String,
    pub shape: (usize, usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceOutcome {
    pub merge_columns: Vec<String>,
    pub amount_columns: Vec<String>,
    pub resulting_shape: (usize, usize),
    /// Variance-percentage column to the number of rows left null because the
    /// budget was zero.
    pub undefined_pct: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceOutcome {
    pub threshold: f64,
    pub columns: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YtdOutcome {
    pub group_columns: Vec<String>,
    pub amount_columns: Vec<String>,
    pub groups: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imputation_method_parsing() {
        assert_eq!("mean".parse::<ImputationMethod>(), Ok(ImputationMethod::Mean));
        assert_eq!(
            "ffill".parse::<ImputationMethod>(),
            Ok(ImputationMethod::ForwardFill)
        );
        assert_eq!(
            " Backward_Fill ".parse::<ImputationMethod>(),
            Ok(ImputationMethod::BackwardFill)
        );
        assert!("interpolate".parse::<ImputationMethod>().is_err());
    }

    #[test]
    fn test_join_kind_parsing() {
        assert_eq!("outer".parse::<JoinKind>(), Ok(JoinKind::Outer));
        assert_eq!("FULL".parse::<JoinKind>(), Ok(JoinKind::Outer));
        assert!("cross".parse::<JoinKind>().is_err());
    }

    #[test]
    fn test_column_rule_from_json() {
        let json = r#"{
            "column": "amount",
            "type": "numeric",
            "range": [0, 100],
            "derived": {"name": "amount_half", "derivation": {"kind": "ratio", "value": 2.0}}
        }"#;

        let rule: ColumnRule = serde_json::from_str(json).expect("rule should deserialize");
        assert_eq!(rule.column, "amount");
        assert_eq!(rule.expected_type, Some(ExpectedType::Numeric));
        assert_eq!(rule.range, Some((0.0, 100.0)));
        let derived = rule.derived.unwrap();
        assert_eq!(derived.name, "amount_half");
        assert!(matches!(derived.derivation, Derivation::Ratio(v) if v == 2.0));
    }

    #[test]
    fn test_unit_derivation_from_json() {
        let derivation: Derivation = serde_json::from_str(r#"{"kind": "square"}"#).unwrap();
        assert_eq!(derivation.name(), "square");
    }

    #[test]
    fn test_column_selection() {
        assert_eq!(ColumnSelection::all().names(), None);
        let named = ColumnSelection::named(["a", "b"]);
        assert_eq!(named.names().unwrap(), ["a".to_string(), "b".to_string()]);
        assert_eq!(ColumnSelection::from(None), ColumnSelection::All);
    }
}
