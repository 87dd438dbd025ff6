//! Financial Table Cleaning Library
//!
//! Ingest tabular financial data, normalize it, clean it step by step and
//! keep an ordered audit trail of everything that was done, built on Polars.
//!
//! # Overview
//!
//! - **Sources**: CSV (file or text), spreadsheets, JSON, record lists,
//!   column dictionaries and in-memory tables
//! - **Normalization**: empty rows/columns dropped, names trimmed, blanks and
//!   spreadsheet NA markers nulled, numeric text coerced
//! - **Cleaning**: imputation, standardization, min-max normalization,
//!   deduplication, rule-based verification/enrichment and merging
//! - **Audit log**: one entry per operation with its parameters and outcome
//! - **Variance analysis**: budget versus actual alignment, significant
//!   variances and year-to-date roll-ups
//!
//! # Quick Start
//!
//! ```rust
//! use finclean::{ColumnSelection, ExportFormat, ImportSource, Pipeline};
//!
//! let csv = "date,account,amount\n\
//!            2024-01-31,rent,1200\n\
//!            2024-02-29,rent,\n\
//!            2024-03-31,rent,1300\n";
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.import(ImportSource::csv_text(csv))?;
//! pipeline.rebuild_missing_data([("amount", "mean")])?;
//! pipeline.normalize(ColumnSelection::named(["amount"]))?;
//!
//! let records = pipeline
//!     .export(ExportFormat::RecordList)?
//!     .into_records()
//!     .unwrap_or_default();
//! assert_eq!(records.len(), 3);
//!
//! for entry in pipeline.log() {
//!     println!("#{} {}", entry.sequence, entry.operation);
//! }
//! # Ok::<(), finclean::CleaningError>(())
//! ```
//!
//! # Configuration
//!
//! Use [`PipelineConfig`] to adjust parsing and operation defaults:
//!
//! ```rust
//! use finclean::{KeepStrategy, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .csv_separator(b';')
//!     .merge_suffixes("_left", "_right")
//!     .default_keep(KeepStrategy::Last)
//!     .build()
//!     .unwrap();
//!
//! let pipeline = Pipeline::builder().config(config).build().unwrap();
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod operations;
pub mod persistence;
pub mod pipeline;
pub mod retention;
pub mod source;
pub mod types;
pub mod utils;
pub mod variance;

// Re-exports for convenient access
pub use audit::{ClosureEntrySink, EntrySink, OperationKind, OperationLog, OperationLogEntry};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{CleaningError, Result as CleaningResult, ResultExt};
pub use normalizer::{NormalizationReport, TableNormalizer};
pub use operations::ScaleMethod;
pub use persistence::{MemorySink, PersistenceError, PersistenceSink, RecordId};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineState, SharedPipeline};
pub use retention::{RetentionPolicy, RetentionReport, prune_logs};
pub use source::{CsvInput, ImportOptions, ImportSource, TableSource};
pub use types::{
    ColumnRule, ColumnSelection, Derivation, DerivationFn, DerivedColumn, ExpectedType,
    ExportFormat, ExportOutput, ImputationMethod, JoinKind, KeepStrategy, Record,
};
pub use utils::{parse_date_string, parse_numeric_string};
pub use variance::VarianceEngine;
