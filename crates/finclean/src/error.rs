//! Error types for the cleaning pipeline.
//!
//! Four structural kinds always reach the caller: [`CleaningError::Import`],
//! [`CleaningError::Schema`], [`CleaningError::State`] and
//! [`CleaningError::Type`]. Per-column problems inside an operation (unknown
//! column, unknown method, failed derivation) are never raised; they are
//! written to the operation log instead.
//!
//! Errors serialize as `{ code, message }` so a reporting layer can forward
//! them without knowing the enum.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the cleaning pipeline.
#[derive(Error, Debug)]
pub enum CleaningError {
    /// Source could not be read or holds no usable data.
    #[error("Import failed: {0}")]
    Import(String),

    /// Column names collide or a required column is missing.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Operation invoked out of sequence.
    #[error("Invalid pipeline state: {0}")]
    State(String),

    /// A required field could not be coerced to the requested type.
    #[error("Failed to coerce column '{column}': {reason}")]
    Type { column: String, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Workbook reader error.
    #[error("Spreadsheet error: {0}")]
    Excel(#[from] calamine::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CleaningError>,
    },
}

impl CleaningError {
    /// Shorthand for a [`CleaningError::Type`].
    pub fn type_error(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Type {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CleaningError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for callers that branch on the kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Import(_) => "IMPORT_ERROR",
            Self::Schema(_) => "SCHEMA_ERROR",
            Self::State(_) => "STATE_ERROR",
            Self::Type { .. } => "TYPE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Excel(_) => "EXCEL_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// True for the four kinds that describe a caller mistake or bad input
    /// rather than an infrastructure failure.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::Import(_) | Self::Schema(_) | Self::State(_) | Self::Type { .. } => true,
            Self::WithContext { source, .. } => source.is_structural(),
            _ => false,
        }
    }

    /// Re-tag any error raised while reading a source as an import failure.
    ///
    /// Structural errors pass through untouched so a schema collision found
    /// during import still surfaces as `SCHEMA_ERROR`.
    pub(crate) fn into_import(self) -> Self {
        if self.is_structural() {
            self
        } else {
            Self::Import(self.to_string())
        }
    }
}

impl Serialize for CleaningError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("CleaningError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, CleaningError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CleaningError::Polars(e).with_context(context))
    }
}
