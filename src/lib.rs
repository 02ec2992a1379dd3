// Library interface for SquadRS modules
// This allows integration tests and benches to access the core functionality

pub mod association;
pub mod availability;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod output;
pub mod period;
pub mod pipeline;
pub mod series;
pub mod stats;

// Re-export commonly used types for convenience
pub use models::*;
pub use database::Database;
pub use metrics::Metric;
pub use output::OutputTables;
pub use period::{PeriodResolver, Window};
pub use pipeline::{compute, run_batch, BatchRequest, BatchResponse, ComputedPayload};
pub use error::{SquadRsError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat, DiagnosticReport};
