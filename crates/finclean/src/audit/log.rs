use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::sink::EntrySink;

/// Every operation that can appear in an audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ImportData,
    RebuildMissingData,
    Standardize,
    Normalize,
    Deduplicate,
    VerifyAndEnrich,
    MergeDatasets,
    ExportData,
    CalculateVariances,
    GetSignificantVariances,
    CalculateYtdPerformance,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImportData => "import_data",
            Self::RebuildMissingData => "rebuild_missing_data",
            Self::Standardize => "standardize",
            Self::Normalize => "normalize",
            Self::Deduplicate => "deduplicate",
            Self::VerifyAndEnrich => "verify_and_enrich",
            Self::MergeDatasets => "merge_datasets",
            Self::ExportData => "export_data",
            Self::CalculateVariances => "calculate_variances",
            Self::GetSignificantVariances => "get_significant_variances",
            Self::CalculateYtdPerformance => "calculate_ytd_performance",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    /// Position in the log, starting at 0 after each import.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: OperationKind,
    pub details: Map<String, Value>,
}

/// Append-only, ordered record of the operations applied to a table.
///
/// [`record`](Self::record) is the only way in; history is handed out as a
/// shared slice.
#[derive(Default)]
pub struct OperationLog {
    entries: Vec<OperationLogEntry>,
    sink: Option<Arc<dyn EntrySink>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_sink(&mut self, sink: Option<Arc<dyn EntrySink>>) {
        self.sink = sink;
    }

    /// Append an entry whose details are the serialized form of `details`.
    ///
    /// Structs and maps become the details object directly; any other value is
    /// stored under a `value` key.
    pub fn record<T: Serialize + ?Sized>(
        &mut self,
        operation: OperationKind,
        details: &T,
    ) -> &OperationLogEntry {
        let details = match serde_json::to_value(details) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            Err(e) => {
                warn!("Details for '{}' could not be serialized: {}", operation, e);
                let mut map = Map::new();
                map.insert("serialization_error".to_string(), Value::String(e.to_string()));
                map
            }
        };

        let entry = OperationLogEntry {
            sequence: self.entries.len() as u64,
            timestamp: Utc::now(),
            operation,
            details,
        };
        debug!("Log entry #{}: {}", entry.sequence, entry.operation);

        if let Some(sink) = &self.sink {
            sink.on_entry(&entry);
        }
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[OperationLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&OperationLogEntry> {
        self.entries.last()
    }

    /// Start a new epoch. Only a fresh import does this.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
    }

    /// The whole log as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

impl fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationLog")
            .field("entries", &self.entries)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DedupOutcome;
    use crate::types::KeepStrategy;
    use serde_json::json;

    #[test]
    fn test_sequence_follows_call_order() {
        let mut log = OperationLog::new();
        log.record(OperationKind::ImportData, &json!({"rows": 10}));
        log.record(OperationKind::Normalize, &json!({"columns": ["a"]}));
        let last = log.record(OperationKind::ExportData, &json!({}));
        assert_eq!(last.sequence, 2);

        let kinds: Vec<OperationKind> = log.entries().iter().map(|e| e.operation).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::ImportData,
                OperationKind::Normalize,
                OperationKind::ExportData
            ]
        );
        let timestamps: Vec<_> = log.entries().iter().map(|e| e.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut log = OperationLog::new();
        log.record(OperationKind::ImportData, &json!({}));
        log.record(OperationKind::Standardize, &json!({}));
        log.reset();
        assert!(log.is_empty());
        assert_eq!(log.record(OperationKind::ImportData, &json!({})).sequence, 0);
    }

    #[test]
    fn test_struct_details_and_scalar_details() {
        let mut log = OperationLog::new();
        let outcome = DedupOutcome {
            columns_considered: Some(vec!["k".to_string()]),
            keep_strategy: KeepStrategy::Last,
            rows_removed: 1,
        };
        let entry = log.record(OperationKind::Deduplicate, &outcome);
        assert_eq!(entry.details["keep_strategy"], json!("last"));
        assert_eq!(entry.details["rows_removed"], json!(1));

        let entry = log.record(OperationKind::ExportData, &"csv");
        assert_eq!(entry.details["value"], json!("csv"));
    }

    #[test]
    fn test_json_uses_snake_case_operations() {
        let mut log = OperationLog::new();
        log.record(OperationKind::GetSignificantVariances, &json!({"count": 0}));
        let text = log.to_json().unwrap();
        assert!(text.contains("\"get_significant_variances\""));

        let parsed: Vec<OperationLogEntry> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, log.entries());
    }
}
