//! Table sources.
//!
//! Adapters that turn an external representation into a polars
//! [`DataFrame`], followed by the [`TableNormalizer`] pass every import goes
//! through. Parsing failures of any kind surface as
//! [`CleaningError::Import`].

mod csv;
mod excel;
mod records;

use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{CleaningError, Result};
use crate::normalizer::{NormalizationReport, NormalizeOptions, TableNormalizer};
use crate::types::Record;

pub use excel::sheet_names;

/// Delimited text, either on disk or already in memory.
#[derive(Debug, Clone)]
pub enum CsvInput {
    Path(PathBuf),
    Text(String),
}

/// Everything the pipeline can import.
#[derive(Debug, Clone)]
pub enum ImportSource {
    Csv(CsvInput),
    /// Spreadsheet workbook; `None` selects the first sheet.
    Xlsx {
        path: PathBuf,
        sheet: Option<String>,
    },
    /// JSON text, records orient or columns orient.
    Json(String),
    /// Record list, as produced by `export(RecordList)`.
    Records(Vec<Record>),
    /// Column name to values; every column must have the same length.
    Dict(Vec<(String, Vec<Value>)>),
    /// In-memory table.
    Table(DataFrame),
}

impl ImportSource {
    pub fn csv_path(path: impl Into<PathBuf>) -> Self {
        Self::Csv(CsvInput::Path(path.into()))
    }

    pub fn csv_text(text: impl Into<String>) -> Self {
        Self::Csv(CsvInput::Text(text.into()))
    }

    pub fn xlsx(path: impl Into<PathBuf>, sheet: Option<String>) -> Self {
        Self::Xlsx {
            path: path.into(),
            sheet,
        }
    }

    /// Pick a file source from the extension of `path`.
    ///
    /// `.csv`/`.tsv`/`.txt` read as delimited text, `.xlsx`/`.xlsm`/`.xls`
    /// as workbooks, `.json` as JSON text.
    pub fn from_path(path: impl AsRef<Path>, sheet: Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::csv_path(path)),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::xlsx(path, sheet)),
            "json" => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    CleaningError::Import(format!("cannot read '{}': {e}", path.display()))
                })?;
                Ok(Self::Json(text))
            }
            other => Err(CleaningError::Import(format!(
                "unsupported file type '{other}' for '{}'",
                path.display()
            ))),
        }
    }

    /// Source kind recorded as `format_type` in the import entry.
    pub fn format_type(&self) -> &'static str {
        match self {
            Self::Csv(_) => "csv",
            Self::Xlsx { .. } => "xlsx",
            Self::Json(_) => "json",
            Self::Records(_) => "records",
            Self::Dict(_) => "dict",
            Self::Table(_) => "dataframe",
        }
    }

    /// Short human-readable origin: a path, or `<inline>`.
    pub fn describe(&self) -> String {
        match self {
            Self::Csv(CsvInput::Path(path)) => path.display().to_string(),
            Self::Xlsx { path, sheet } => match sheet {
                Some(sheet) => format!("{}#{sheet}", path.display()),
                None => path.display().to_string(),
            },
            _ => "<inline>".to_string(),
        }
    }

    /// File sources carry spreadsheet-style missing markers like `#N/A`.
    fn is_file_source(&self) -> bool {
        matches!(self, Self::Csv(_) | Self::Xlsx { .. })
    }
}

/// Parser settings derived from [`PipelineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub csv_separator: u8,
    pub infer_schema_length: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for ImportOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            csv_separator: config.csv_separator,
            infer_schema_length: config.infer_schema_length,
        }
    }
}

/// A parsed and normalized table with the normalizer's report.
#[derive(Debug, Clone)]
pub struct ImportedTable {
    pub table: DataFrame,
    pub report: NormalizationReport,
}

/// Entry point for reading sources.
pub struct TableSource;

impl TableSource {
    /// Parse a source into a raw table, without normalization.
    pub fn read(source: ImportSource, options: &ImportOptions) -> Result<DataFrame> {
        let df = match source {
            ImportSource::Csv(input) => csv::read_csv(&input, options),
            ImportSource::Xlsx { path, sheet } => excel::read_sheet(&path, sheet.as_deref()),
            ImportSource::Json(text) => records::read_json(&text),
            ImportSource::Records(rows) => records::from_records(&rows),
            ImportSource::Dict(columns) => records::from_columns(columns),
            ImportSource::Table(df) => Ok(df),
        }
        .map_err(CleaningError::into_import)?;

        if df.width() == 0 {
            return Err(CleaningError::Import("source has no columns".to_string()));
        }

        debug!("Parsed raw table: {} rows x {} columns", df.height(), df.width());
        Ok(df)
    }

    /// Parse and normalize a source.
    pub fn import(source: ImportSource, options: &ImportOptions) -> Result<ImportedTable> {
        let normalize = NormalizeOptions {
            missing_markers: source.is_file_source(),
        };
        let origin = source.describe();

        let raw = Self::read(source, options)?;
        let (table, report) = TableNormalizer::normalize(raw, &normalize)?;

        info!(
            "Imported {origin}: {} rows x {} columns",
            table.height(),
            table.width()
        );
        Ok(ImportedTable { table, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_from_path_by_extension() {
        assert!(matches!(
            ImportSource::from_path("data/ledger.CSV", None).unwrap(),
            ImportSource::Csv(CsvInput::Path(_))
        ));
        assert!(matches!(
            ImportSource::from_path("book.xlsx", Some("Q1".to_string())).unwrap(),
            ImportSource::Xlsx { sheet: Some(_), .. }
        ));
        let err = ImportSource::from_path("notes.pdf", None).unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_ERROR");
    }

    #[test]
    fn test_describe() {
        assert_eq!(ImportSource::csv_path("a.csv").describe(), "a.csv");
        assert_eq!(
            ImportSource::xlsx("b.xlsx", Some("Q2".to_string())).describe(),
            "b.xlsx#Q2"
        );
        assert_eq!(ImportSource::csv_text("x\n1").describe(), "<inline>");
    }

    #[test]
    fn test_import_table_source() {
        let df = df!("a" => &[1i64, 2], "b" => &["x", "y"]).unwrap();
        let imported =
            TableSource::import(ImportSource::Table(df), &ImportOptions::default()).unwrap();
        assert_eq!(imported.table.shape(), (2, 2));
    }

    #[test]
    fn test_empty_table_is_import_error() {
        let df = DataFrame::empty();
        let err = TableSource::import(ImportSource::Table(df), &ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_ERROR");
    }

    #[test]
    fn test_missing_markers_only_for_file_sources() {
        let csv = "id,amount\n1,N/A\n2,5\n";
        let imported =
            TableSource::import(ImportSource::csv_text(csv), &ImportOptions::default()).unwrap();
        let amount = imported.table.column("amount").unwrap();
        assert_eq!(amount.null_count(), 1);
        assert!(amount.dtype().is_numeric());

        let dict = ImportSource::Dict(vec![(
            "code".to_string(),
            vec![Value::from("NA"), Value::from("EU")],
        )]);
        let imported = TableSource::import(dict, &ImportOptions::default()).unwrap();
        assert_eq!(imported.table.column("code").unwrap().null_count(), 0);
    }
}
