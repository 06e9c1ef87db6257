//! Error types for the dataset analysis engine.
//!
//! Only schema-level and sampling-precondition violations surface as errors.
//! Everything recoverable (ambiguous types, undefined correlations, budget
//! overruns) is resolved locally and recorded as a flag in the report.
//!
//! Errors are serializable so a calling service can forward them as
//! `{ code, message }` documents.

use crate::config::ConfigValidationError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for dataset analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The table has no rows or no columns.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A sampling call was made with inputs it cannot satisfy.
    #[error("Sampling precondition violated: {0}")]
    SamplingPrecondition(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// Analysis was cancelled between chunks.
    #[error("Analysis cancelled")]
    Cancelled,

    /// Internal error (e.g., an invariant broken while merging chunks).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AnalysisError>,
    },
}

impl AnalysisError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AnalysisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for callers that branch on error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "SCHEMA_ERROR",
            Self::SamplingPrecondition(_) => "SAMPLING_PRECONDITION",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Cancelled => "CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Schema errors mean no partial report can be produced for this table.
    pub fn is_schema_error(&self) -> bool {
        match self {
            Self::Schema(_) => true,
            Self::WithContext { source, .. } => source.is_schema_error(),
            _ => false,
        }
    }
}

impl Serialize for AnalysisError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AnalysisError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

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
        self.map_err(|e| AnalysisError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(AnalysisError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            AnalysisError::Schema("empty".to_string()).error_code(),
            "SCHEMA_ERROR"
        );
        assert_eq!(
            AnalysisError::ColumnNotFound("Class".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[test]
    fn test_is_cancelled_through_context() {
        let error = AnalysisError::Cancelled.with_context("During aggregation");
        assert!(error.is_cancelled());
        assert!(!AnalysisError::Schema("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_is_schema_error() {
        assert!(AnalysisError::Schema("no rows".to_string()).is_schema_error());
        assert!(!AnalysisError::Internal("x".to_string()).is_schema_error());
    }

    #[test]
    fn test_error_serialization() {
        let error = AnalysisError::ColumnNotFound("amount".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("amount"));
    }

    #[test]
    fn test_with_context_preserves_code() {
        let error =
            AnalysisError::Schema("zero columns".to_string()).with_context("Validating table");
        assert!(error.to_string().contains("Validating table"));
        assert_eq!(error.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_config_error_converts() {
        let error: AnalysisError =
            ConfigValidationError::ZeroValue("chunk_size".to_string()).into();
        assert_eq!(error.error_code(), "INVALID_CONFIG");
    }
}
