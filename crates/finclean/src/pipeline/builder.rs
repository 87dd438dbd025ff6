//! The cleaning pipeline and its builder.

use std::sync::Arc;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{ClosureEntrySink, EntrySink, OperationKind, OperationLog, OperationLogEntry};
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::{CleaningError, Result};
use crate::operations;
use crate::persistence::PersistenceSink;
use crate::pipeline::export::export_table;
use crate::pipeline::state::PipelineState;
use crate::source::{ImportOptions, ImportSource, TableSource};
use crate::types::{
    ColumnRule, ColumnSelection, ExportFormat, ExportOutcome, ExportOutput, ImportOutcome,
    JoinKind, KeepStrategy,
};
use crate::utils::column_names;

/// Stateful cleaning pipeline over one table.
///
/// Holds the table as imported (`original_table`) and the table after every
/// operation so far (`working_table`). Operations never modify a table in
/// place: each one builds a new table, swaps it in and appends exactly one
/// entry to the pipeline's [`OperationLog`].
///
/// # Example
///
/// ```rust
/// use finclean::{ColumnSelection, ExportFormat, ImportSource, Pipeline};
///
/// let mut pipeline = Pipeline::new();
/// pipeline.import(ImportSource::csv_text("k,v\n1,a\n1,a\n2,b\n")).unwrap();
/// pipeline.deduplicate(ColumnSelection::all(), None).unwrap();
///
/// let csv = pipeline.export(ExportFormat::CsvText).unwrap().into_text().unwrap();
/// assert_eq!(csv, "k,v\n1,a\n2,b\n");
/// assert_eq!(pipeline.log().len(), 3);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    state: PipelineState,
    original: Option<DataFrame>,
    working: Option<DataFrame>,
    log: OperationLog,
    persistence: Option<Arc<dyn PersistenceSink>>,
}

// Callers may hand a pipeline to a worker thread.
static_assertions::assert_impl_all!(Pipeline: Send);

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// A pipeline with the default configuration, no sinks.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            state: PipelineState::Uninitialized,
            original: None,
            working: None,
            log: OperationLog::new(),
            persistence: None,
        }
    }

    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Snapshot taken at the last import.
    pub fn original_table(&self) -> Option<&DataFrame> {
        self.original.as_ref()
    }

    /// Current table.
    pub fn working_table(&self) -> Option<&DataFrame> {
        self.working.as_ref()
    }

    /// Ordered history since the last import.
    pub fn log(&self) -> &[OperationLogEntry] {
        self.log.entries()
    }

    /// The whole log as pretty-printed JSON.
    pub fn log_json(&self) -> Result<String> {
        Ok(self.log.to_json()?)
    }

    /// Parse, normalize and adopt a new table.
    ///
    /// This is a hard reset: the previous tables and log are discarded and
    /// the log restarts at sequence 0 with the `import_data` entry. A failed
    /// import leaves the pipeline as it was.
    pub fn import(&mut self, source: ImportSource) -> Result<&DataFrame> {
        let (table, outcome) = load_source(source, &self.config, self.persistence.as_deref())?;

        self.log.reset();
        self.log.record(OperationKind::ImportData, &outcome);
        self.original = Some(table.clone());
        self.state = PipelineState::Imported;
        Ok(self.working.insert(table))
    }

    /// Fill missing values per column.
    ///
    /// Accepts anything that pairs a column name with a method name, such as
    /// `[("amount", "mean")]` or `[("region", ImputationMethod::Mode)]`.
    pub fn rebuild_missing_data<I, K, V>(&mut self, methods: I) -> Result<&DataFrame>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let methods: Vec<(String, String)> = methods
            .into_iter()
            .map(|(column, method)| (column.into(), method.to_string()))
            .collect();
        let df = self.current(OperationKind::RebuildMissingData)?;
        let (table, outcome) = operations::rebuild_missing_data(df, &methods)?;
        self.commit(OperationKind::RebuildMissingData, table, &outcome)
    }

    /// Z-score the selected numeric columns.
    pub fn standardize(&mut self, columns: ColumnSelection) -> Result<&DataFrame> {
        let df = self.current(OperationKind::Standardize)?;
        let (table, outcome) = operations::standardize(df, columns.names())?;
        self.commit(OperationKind::Standardize, table, &outcome)
    }

    /// Min-max the selected numeric columns into `[0, 1]`.
    pub fn normalize(&mut self, columns: ColumnSelection) -> Result<&DataFrame> {
        let df = self.current(OperationKind::Normalize)?;
        let (table, outcome) = operations::normalize(df, columns.names())?;
        self.commit(OperationKind::Normalize, table, &outcome)
    }

    /// Drop duplicate rows. `keep` falls back to the configured default.
    pub fn deduplicate(
        &mut self,
        subset: ColumnSelection,
        keep: Option<KeepStrategy>,
    ) -> Result<&DataFrame> {
        let keep = keep.unwrap_or(self.config.default_keep);
        let df = self.current(OperationKind::Deduplicate)?;
        let (table, outcome) = operations::deduplicate(df, subset.names(), keep)?;
        self.commit(OperationKind::Deduplicate, table, &outcome)
    }

    /// Coerce, range-check and derive columns per rule.
    pub fn verify_and_enrich(&mut self, rules: &[ColumnRule]) -> Result<&DataFrame> {
        let df = self.current(OperationKind::VerifyAndEnrich)?;
        let (table, outcome) = operations::verify_and_enrich(df, rules)?;
        self.commit(OperationKind::VerifyAndEnrich, table, &outcome)
    }

    /// Join `other` into the working table.
    pub fn merge_datasets<S: AsRef<str>>(
        &mut self,
        other: &DataFrame,
        merge_on: &[S],
        how: JoinKind,
    ) -> Result<&DataFrame> {
        let on: Vec<String> = merge_on.iter().map(|s| s.as_ref().to_string()).collect();
        let (left_suffix, right_suffix) = &self.config.merge_suffixes;
        let df = self.current(OperationKind::MergeDatasets)?;
        let (table, outcome) = operations::merge_datasets(
            df,
            other,
            &on,
            how,
            (left_suffix.as_str(), right_suffix.as_str()),
        )?;
        self.commit(OperationKind::MergeDatasets, table, &outcome)
    }

    /// Render the working table. The table itself is left untouched.
    pub fn export(&mut self, format: ExportFormat) -> Result<ExportOutput> {
        let df = self.current(OperationKind::ExportData)?;
        let output = export_table(df, format, self.config.csv_separator)?;
        let outcome = ExportOutcome {
            format_type: format.as_str().to_string(),
            shape: df.shape(),
        };

        self.log.record(OperationKind::ExportData, &outcome);
        self.state = PipelineState::Exported;
        info!("Exported working table as {}", format.as_str());
        Ok(output)
    }

    fn current(&self, operation: OperationKind) -> Result<&DataFrame> {
        self.state.require_table(operation.as_str())?;
        self.working
            .as_ref()
            .ok_or_else(|| CleaningError::State("working table missing".to_string()))
    }

    fn commit<T: Serialize>(
        &mut self,
        operation: OperationKind,
        table: DataFrame,
        outcome: &T,
    ) -> Result<&DataFrame> {
        info!(
            "{} applied: {} rows x {} columns",
            operation,
            table.height(),
            table.width()
        );
        self.log.record(operation, outcome);
        self.state = PipelineState::Cleaned;
        Ok(self.working.insert(table))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("shape", &self.working.as_ref().map(DataFrame::shape))
            .field("log_entries", &self.log.len())
            .field("has_persistence", &self.persistence.is_some())
            .finish()
    }
}

/// Read a source, normalize it and hand it to the persistence sink.
///
/// A sink failure is only a warning: the table stays usable in memory and
/// the outcome records `persisted: false`.
pub(crate) fn load_source(
    source: ImportSource,
    config: &PipelineConfig,
    persistence: Option<&dyn PersistenceSink>,
) -> Result<(DataFrame, ImportOutcome)> {
    let format_type = source.format_type();
    let origin = source.describe();
    let imported = TableSource::import(source, &ImportOptions::from(config))?;
    let table = imported.table;

    let (persisted, record_id) = match persistence {
        Some(sink) if config.persist_imports => {
            match sink.save(&table, &origin, format_type) {
                Ok(id) => {
                    debug!("Persisted {} as {}", origin, id);
                    (Some(true), Some(id.to_string()))
                }
                Err(e) => {
                    warn!("Could not persist {}: {}; continuing in memory", origin, e);
                    (Some(false), None)
                }
            }
        }
        _ => (None, None),
    };

    let outcome = ImportOutcome {
        format_type: format_type.to_string(),
        source: origin,
        shape: table.shape(),
        columns: column_names(&table),
        rows_dropped: imported.report.rows_dropped,
        columns_dropped: imported.report.columns_dropped,
        numeric_columns: imported.report.numeric_columns,
        persisted,
        record_id,
        role: None,
    };
    Ok((table, outcome))
}

/// Builder for creating a [`Pipeline`] with custom configuration.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    persistence: Option<Arc<dyn PersistenceSink>>,
    entry_sink: Option<Arc<dyn EntrySink>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Store every imported table through `sink`.
    ///
    /// Without a sink the pipeline works purely in memory.
    pub fn persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    /// Receive every log entry as it is appended.
    ///
    /// # Example
    ///
    /// ```rust
    /// use finclean::{EntrySink, OperationLogEntry, Pipeline};
    /// use std::sync::Arc;
    ///
    /// struct Printer;
    ///
    /// impl EntrySink for Printer {
    ///     fn on_entry(&self, entry: &OperationLogEntry) {
    ///         println!("#{} {}", entry.sequence, entry.operation);
    ///     }
    /// }
    ///
    /// let pipeline = Pipeline::builder().entry_sink(Arc::new(Printer)).build().unwrap();
    /// ```
    pub fn entry_sink(mut self, sink: Arc<dyn EntrySink>) -> Self {
        self.entry_sink = Some(sink);
        self
    }

    /// Closure form of [`entry_sink`](Self::entry_sink).
    pub fn on_entry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&OperationLogEntry) + Send + Sync + 'static,
    {
        self.entry_sink = Some(Arc::new(ClosureEntrySink::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut log = OperationLog::new();
        log.set_sink(self.entry_sink);

        Ok(Pipeline {
            config,
            state: PipelineState::Uninitialized,
            original: None,
            working: None,
            log,
            persistence: self.persistence,
        })
    }
}
