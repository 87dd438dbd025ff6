//! Configuration types for the cleaning pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::KeepStrategy;

/// Configuration shared by [`Pipeline`](crate::Pipeline) and
/// [`VarianceEngine`](crate::VarianceEngine).
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust
/// use finclean::{KeepStrategy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .csv_separator(b';')
///     .default_keep(KeepStrategy::Last)
///     .build()
///     .unwrap();
/// assert_eq!(config.csv_separator, b';');
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Field separator for delimited text sources.
    /// Default: `,`
    pub csv_separator: u8,

    /// Number of rows scanned to infer CSV column types.
    /// Default: 1000
    pub infer_schema_length: usize,

    /// Suffixes appended to overlapping non-key columns in a merge
    /// (left, right).
    /// Default: ("_x", "_y")
    pub merge_suffixes: (String, String),

    /// Suffixes that tag budget and actual columns in variance tables.
    /// Default: ("_budget", "_actual")
    pub variance_suffixes: (String, String),

    /// Which duplicate survives when a caller does not say.
    /// Default: First
    pub default_keep: KeepStrategy,

    /// Absolute variance percentage at or above which a row is significant.
    /// Default: 5.0
    pub significance_threshold_pct: f64,

    /// Whether imports are handed to the persistence sink, when one is set.
    /// Default: true
    pub persist_imports: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            csv_separator: b',',
            infer_schema_length: 1000,
            merge_suffixes: ("_x".to_string(), "_y".to_string()),
            variance_suffixes: ("_budget".to_string(), "_actual".to_string()),
            default_keep: KeepStrategy::default(),
            significance_threshold_pct: 5.0,
            persist_imports: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.infer_schema_length == 0 {
            return Err(ConfigValidationError::InvalidSchemaLength);
        }

        if !self.csv_separator.is_ascii() || self.csv_separator == b'"' {
            return Err(ConfigValidationError::InvalidSeparator(self.csv_separator));
        }

        Self::check_suffixes("merge_suffixes", &self.merge_suffixes)?;
        Self::check_suffixes("variance_suffixes", &self.variance_suffixes)?;

        if !self.significance_threshold_pct.is_finite() || self.significance_threshold_pct < 0.0 {
            return Err(ConfigValidationError::InvalidThreshold(
                self.significance_threshold_pct,
            ));
        }

        Ok(())
    }

    fn check_suffixes(
        field: &str,
        (left, right): &(String, String),
    ) -> Result<(), ConfigValidationError> {
        if left.is_empty() || right.is_empty() || left == right {
            return Err(ConfigValidationError::InvalidSuffixes {
                field: field.to_string(),
                left: left.clone(),
                right: right.clone(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid suffixes for '{field}': ('{left}', '{right}') (must be non-empty and distinct)")]
    InvalidSuffixes {
        field: String,
        left: String,
        right: String,
    },

    #[error("Invalid significance threshold: {0} (must be a finite value >= 0)")]
    InvalidThreshold(f64),

    #[error("Invalid CSV separator byte: {0}")]
    InvalidSeparator(u8),

    #[error("Invalid infer_schema_length: must be at least 1")]
    InvalidSchemaLength,
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    csv_separator: Option<u8>,
    infer_schema_length: Option<usize>,
    merge_suffixes: Option<(String, String)>,
    variance_suffixes: Option<(String, String)>,
    default_keep: Option<KeepStrategy>,
    significance_threshold_pct: Option<f64>,
    persist_imports: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the field separator for delimited text.
    pub fn csv_separator(mut self, separator: u8) -> Self {
        self.csv_separator = Some(separator);
        self
    }

    /// Set how many rows are scanned for CSV schema inference.
    pub fn infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = Some(rows);
        self
    }

    /// Set the suffixes for overlapping columns in merges.
    pub fn merge_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.merge_suffixes = Some((left.into(), right.into()));
        self
    }

    /// Set the suffixes tagging budget and actual columns.
    pub fn variance_suffixes(
        mut self,
        budget: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.variance_suffixes = Some((budget.into(), actual.into()));
        self
    }

    /// Set the default keep strategy for deduplication.
    pub fn default_keep(mut self, keep: KeepStrategy) -> Self {
        self.default_keep = Some(keep);
        self
    }

    /// Set the default significance threshold, in percent.
    pub fn significance_threshold_pct(mut self, threshold: f64) -> Self {
        self.significance_threshold_pct = Some(threshold);
        self
    }

    /// Enable or disable handing imports to the persistence sink.
    pub fn persist_imports(mut self, persist: bool) -> Self {
        self.persist_imports = Some(persist);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            csv_separator: self.csv_separator.unwrap_or(defaults.csv_separator),
            infer_schema_length: self
                .infer_schema_length
                .unwrap_or(defaults.infer_schema_length),
            merge_suffixes: self.merge_suffixes.unwrap_or(defaults.merge_suffixes),
            variance_suffixes: self.variance_suffixes.unwrap_or(defaults.variance_suffixes),
            default_keep: self.default_keep.unwrap_or(defaults.default_keep),
            significance_threshold_pct: self
                .significance_threshold_pct
                .unwrap_or(defaults.significance_threshold_pct),
            persist_imports: self.persist_imports.unwrap_or(defaults.persist_imports),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.csv_separator, b',');
        assert_eq!(config.infer_schema_length, 1000);
        assert_eq!(config.merge_suffixes, ("_x".to_string(), "_y".to_string()));
        assert_eq!(config.default_keep, KeepStrategy::First);
        assert_eq!(config.significance_threshold_pct, 5.0);
        assert!(config.persist_imports);
    }

    #[test]
    fn test_builder_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .csv_separator(b'\t')
            .merge_suffixes("_left", "_right")
            .significance_threshold_pct(10.0)
            .persist_imports(false)
            .build()
            .unwrap();

        assert_eq!(config.csv_separator, b'\t');
        assert_eq!(config.merge_suffixes.0, "_left");
        assert_eq!(config.significance_threshold_pct, 10.0);
        assert!(!config.persist_imports);
    }

    #[test]
    fn test_validation_identical_suffixes() {
        let result = PipelineConfig::builder().merge_suffixes("_a", "_a").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidSuffixes { .. }
        ));
    }

    #[test]
    fn test_validation_negative_threshold() {
        let result = PipelineConfig::builder()
            .significance_threshold_pct(-1.0)
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold(_)
        ));
    }

    #[test]
    fn test_validation_zero_schema_length() {
        let result = PipelineConfig::builder().infer_schema_length(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidSchemaLength
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "csv_separator": 59, "default_keep": "last" }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.csv_separator, b';');
        assert_eq!(config.default_keep, KeepStrategy::Last);
        assert_eq!(config.variance_suffixes.1, "_actual");
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "merge_suffixes": ["_l", "_r"] }"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.merge_suffixes, ("_l".to_string(), "_r".to_string()));
    }
}
