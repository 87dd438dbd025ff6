use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CleaningError, Result};

/// Lifecycle of a [`Pipeline`](super::Pipeline).
///
/// ```text
/// Uninitialized --import--> Imported --op--> Cleaned --export--> Exported
///                              ^                 |  ^                 |
///                              |                 +--+ op              |
///                              +---------- import (any state) --------+
/// ```
///
/// Exporting does not freeze the table: a later operation moves the pipeline
/// back to `Cleaned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Uninitialized,
    Imported,
    Cleaned,
    Exported,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Imported => "imported",
            Self::Cleaned => "cleaned",
            Self::Exported => "exported",
        }
    }

    /// True once a table has been imported.
    pub fn has_table(&self) -> bool {
        !matches!(self, Self::Uninitialized)
    }

    /// Fail with a `StateError` unless a table is loaded.
    pub(crate) fn require_table(&self, operation: &str) -> Result<()> {
        if self.has_table() {
            Ok(())
        } else {
            Err(CleaningError::State(format!(
                "'{operation}' requires an imported table (pipeline is {self})"
            )))
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_table() {
        let err = PipelineState::Uninitialized
            .require_table("standardize")
            .unwrap_err();
        assert_eq!(err.error_code(), "STATE_ERROR");
        assert!(err.to_string().contains("uninitialized"));

        for state in [
            PipelineState::Imported,
            PipelineState::Cleaned,
            PipelineState::Exported,
        ] {
            assert!(state.require_table("standardize").is_ok());
        }
    }
}
