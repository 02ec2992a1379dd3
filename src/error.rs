//! Unified error hierarchy for SquadRS
//!
//! Provides a structured error type system with severity levels, retry
//! hints, and the JSON error body returned to the triggering caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all SquadRS operations
#[derive(Debug, Error)]
pub enum SquadRsError {
    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Pre-flight connectivity check failed
    #[error("Database connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Query execution failed
    #[error("Query failed on {table}: {reason}")]
    QueryFailed { table: String, reason: String },

    /// Output replacement failed and was rolled back
    #[error("Transaction error: {reason}")]
    TransactionError { reason: String },

    /// Stored value could not be decoded
    #[error("Malformed value in {table}.{column}: {value}")]
    MalformedValue {
        table: String,
        column: String,
        value: String,
    },

    /// Underlying SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Requested team has no athletes
    #[error("No athletes found for team {team_id}")]
    EmptyRoster { team_id: i64 },
}

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Writing the export failed
    #[error("Export failed to {}: {reason}", .path.display())]
    WriteFailed { path: PathBuf, reason: String },

    /// CSV encoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for SquadRS operations
pub type Result<T> = std::result::Result<T, SquadRsError>;

impl From<rusqlite::Error> for SquadRsError {
    fn from(error: rusqlite::Error) -> Self {
        SquadRsError::Database(DatabaseError::Sqlite(error))
    }
}

impl From<csv::Error> for SquadRsError {
    fn from(error: csv::Error) -> Self {
        SquadRsError::Export(ExportError::Csv(error))
    }
}

impl SquadRsError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SquadRsError::Database(DatabaseError::ConnectionFailed { .. })
                | SquadRsError::Database(DatabaseError::TransactionError { .. })
                | SquadRsError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SquadRsError::Validation(_) => ErrorSeverity::Warning,
            SquadRsError::Calculation(CalculationError::EmptyRoster { .. }) => ErrorSeverity::Warning,
            SquadRsError::Database(DatabaseError::MalformedValue { .. }) => ErrorSeverity::Error,
            SquadRsError::Database(_) => ErrorSeverity::Error,
            SquadRsError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            SquadRsError::Database(DatabaseError::ConnectionFailed { .. }) => "connection_error",
            SquadRsError::Database(_) => "database_error",
            SquadRsError::Calculation(_) => "calculation_error",
            SquadRsError::Export(_) => "export_error",
            SquadRsError::Validation(_) => "validation_error",
            SquadRsError::Io(_) => "io_error",
            SquadRsError::Configuration(_) => "configuration_error",
            SquadRsError::Internal(_) => "internal_error",
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SquadRsError::Database(DatabaseError::ConnectionFailed { .. }) => {
                "Unable to connect to database. Please check your configuration.".to_string()
            }
            SquadRsError::Database(DatabaseError::TransactionError { .. }) => {
                "Computed metrics could not be saved; previous results were kept.".to_string()
            }
            SquadRsError::Calculation(CalculationError::EmptyRoster { team_id }) => {
                format!("Team {} has no athletes to compute metrics for.", team_id)
            }
            _ => self.to_string(),
        }
    }

    /// JSON body returned to the caller when a batch fails
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind().to_string(),
            message: self.user_message(),
            timestamp: Utc::now(),
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
