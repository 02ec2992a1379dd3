//! File exports of a computed payload
//!
//! JSON carries the full payload or a single table; CSV is offered for the
//! per-athlete tables that analysts open in spreadsheets.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{ExportError, Result, SquadRsError};
use crate::pipeline::ComputedPayload;

pub mod csv;
pub mod json;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = SquadRsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(SquadRsError::Validation(format!("Unsupported export format: {}", s))),
        }
    }
}

/// What part of the payload to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    /// The complete payload (JSON only)
    Payload,
    /// `all_time_metrics` rows
    AllTimeMetrics,
    /// `alert_system` baselines
    AlertSystem,
    /// `recovery_squad_availability` rows
    Availability,
}

impl std::str::FromStr for ExportKind {
    type Err = SquadRsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "payload" => Ok(ExportKind::Payload),
            "all_time" | "all_time_metrics" => Ok(ExportKind::AllTimeMetrics),
            "alerts" | "alert_system" => Ok(ExportKind::AlertSystem),
            "availability" | "recovery_squad_availability" => Ok(ExportKind::Availability),
            _ => Err(SquadRsError::Validation(format!("Unknown export kind: {}", s))),
        }
    }
}

/// Write `kind` of `payload` to `output_path`, returning the number of records written
pub fn export_payload<P: AsRef<Path>>(
    payload: &ComputedPayload,
    format: ExportFormat,
    kind: ExportKind,
    output_path: P,
) -> Result<usize> {
    let path = output_path.as_ref();
    let tables = &payload.tables;

    let written = match (format, kind) {
        (ExportFormat::Json, ExportKind::Payload) => {
            json::export_json(payload, path)?;
            1
        }
        (ExportFormat::Json, ExportKind::AllTimeMetrics) => {
            json::export_json(&tables.all_time_metrics, path)?;
            tables.all_time_metrics.len()
        }
        (ExportFormat::Json, ExportKind::AlertSystem) => {
            json::export_json(&tables.alert_system, path)?;
            tables.alert_system.len()
        }
        (ExportFormat::Json, ExportKind::Availability) => {
            json::export_json(&tables.recovery_squad_availability, path)?;
            tables.recovery_squad_availability.len()
        }
        (ExportFormat::Csv, ExportKind::AllTimeMetrics) => {
            csv::export_all_time_metrics(&tables.all_time_metrics, path)?
        }
        (ExportFormat::Csv, ExportKind::AlertSystem) => csv::export_alert_system(&tables.alert_system, path)?,
        (ExportFormat::Csv, ExportKind::Availability) => {
            csv::export_availability(&tables.recovery_squad_availability, path)?
        }
        (ExportFormat::Csv, ExportKind::Payload) => {
            return Err(ExportError::Serialization(
                "the full payload can only be exported as JSON".to_string(),
            )
            .into());
        }
    };

    info!(?format, ?kind, records = written, path = %path.display(), "Export written");
    Ok(written)
}

fn write_failed(path: &Path, error: impl std::fmt::Display) -> ExportError {
    ExportError::WriteFailed {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
