//! Batch recomputation
//!
//! One request recomputes every output table of a team from scratch:
//! fetch the raw tables, compute in memory, then replace the stored
//! outputs in a single transaction. Nothing is carried between runs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Level};
use uuid::Uuid;

use crate::association::FactIndex;
use crate::availability::{squad_availability, SquadAvailabilitySummary};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::database::Database;
use crate::error::{CalculationError, Result, SquadRsError};
use crate::logging::DiagnosticReport;
use crate::metrics::Metric;
use crate::models::{AthleteId, RawTables, TeamId};
use crate::output::{AthletePeriodValues, OutputAssembler, OutputTables};
use crate::period::{PeriodResolver, PeriodSet, Window};
use crate::series::{all_time_averages, baseline_series, ChartSeries, SeriesBuilder};
use crate::stats::AlertBaseline;

/// Windows of the recovery/workload line charts
pub const SQUAD_CHART_WINDOWS: [Window; 3] = [Window::Today, Window::Last7Days, Window::Last30Days];

/// Windows of the per-athlete performance chart
pub const PERFORMANCE_CHART_WINDOWS: [Window; 3] =
    [Window::Last7Days, Window::Last30Days, Window::Last6Months];

/// Everything one batch computes for a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedPayload {
    pub run_id: Uuid,
    pub team_id: TeamId,
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
    pub athlete_count: usize,
    pub periods: PeriodSet,
    pub availability: SquadAvailabilitySummary,
    pub tables: OutputTables,
}

/// Parameters of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub team_id: TeamId,
    pub database: PathBuf,
    pub page_size: usize,
    /// Calendar date treated as "today"
    pub as_of: NaiveDate,
    /// Write the outputs back to the database
    pub persist: bool,
    /// Write a diagnostic report to the default location on failure
    pub save_diagnostics: bool,
}

impl BatchRequest {
    pub fn new(team_id: TeamId, database: impl Into<PathBuf>) -> Self {
        BatchRequest {
            team_id,
            database: database.into(),
            page_size: DEFAULT_PAGE_SIZE,
            as_of: Utc::now().date_naive(),
            persist: true,
            save_diagnostics: false,
        }
    }
}

/// Result of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub payload: ComputedPayload,
    /// Whether the output replacement committed
    pub persisted: bool,
    pub duration_ms: u64,
}

/// Compute every output table of `team_id` from `raw`.
///
/// Deterministic for a given `raw` and `as_of`; only `run_id` and
/// `computed_at` differ between calls.
pub fn compute(team_id: TeamId, raw: &RawTables, as_of: NaiveDate) -> ComputedPayload {
    let index = FactIndex::build(raw);
    let roster = raw.athlete_ids();
    let resolver = PeriodResolver::new(as_of);
    let periods = resolver.resolve(raw.earliest_cycle_date());
    let assembler = OutputAssembler::new(team_id);
    let builder = SeriesBuilder::new(&index, resolver);

    debug!(team_id, athletes = roster.len(), %as_of, "Computing outputs");

    let recovery_values = period_values(&index, &periods, &roster, Metric::Recovery);
    let workload_values = period_values(&index, &periods, &roster, Metric::Workload);

    let mut player_series: Vec<ChartSeries> = Vec::new();
    let mut performance_series: Vec<ChartSeries> = Vec::new();
    for athlete_id in &roster {
        for window in SQUAD_CHART_WINDOWS {
            player_series.push(builder.squad_series(window, Some(*athlete_id), &roster));
        }
        for window in PERFORMANCE_CHART_WINDOWS {
            performance_series.push(builder.performance_series(window, *athlete_id));
        }
    }
    let homepage_series: Vec<ChartSeries> = SQUAD_CHART_WINDOWS
        .into_iter()
        .map(|window| builder.squad_series(window, None, &roster))
        .collect();

    let three_months = periods.get(Window::Last3Months);
    let mut all_time_metrics = Vec::new();
    let mut all_time_metrics_averages = Vec::new();
    let mut baselines = Vec::with_capacity(roster.len());
    let mut all_points = Vec::new();

    for athlete_id in &roster {
        let points = builder.all_time_points(*athlete_id);
        all_time_metrics.extend(assembler.all_time_rows(*athlete_id, &points));
        all_time_metrics_averages
            .push(assembler.all_time_average_row(*athlete_id, &all_time_averages(&points)));
        baselines.push(AlertBaseline::compute(
            *athlete_id,
            &baseline_series(&points),
            &three_months,
        ));
        all_points.extend(points);
    }

    let insufficient = baselines.iter().filter(|b| b.is_insufficient()).count();
    if insufficient > 0 {
        debug!(team_id, insufficient, "Athletes without baseline data");
    }

    let availability = squad_availability(&index, &periods, &roster);
    let summary = SquadAvailabilitySummary::from_records(&availability);

    let tables = OutputTables {
        recovery_metrics: assembler.period_metric_rows(&recovery_values),
        workload_metrics: assembler.period_metric_rows(&workload_values),
        recovery_metrics_average: assembler.period_average_rows(Metric::Recovery, &recovery_values),
        workload_metrics_average: assembler.period_average_rows(Metric::Workload, &workload_values),
        player_line_chart_metrics: assembler.player_chart_rows(&player_series),
        performance_line_chart_metrics: assembler.performance_chart_rows(&performance_series),
        all_time_metrics,
        all_time_metrics_averages,
        homepage_line_chart_metrics: assembler.homepage_chart_rows(&homepage_series),
        recovery_squad_availability: assembler.availability_rows(&availability),
        alert_system: assembler.alert_rows(&baselines),
        dbrt: assembler.downtime(&all_points),
    };

    ComputedPayload {
        run_id: Uuid::new_v4(),
        team_id,
        as_of,
        computed_at: Utc::now(),
        athlete_count: roster.len(),
        periods,
        availability: summary,
        tables,
    }
}

fn period_values(
    index: &FactIndex<'_>,
    periods: &PeriodSet,
    roster: &[AthleteId],
    metric: Metric,
) -> Vec<AthletePeriodValues> {
    roster
        .iter()
        .map(|athlete_id| AthletePeriodValues::compute(index, periods, *athlete_id, metric))
        .collect()
}

/// Fetch, compute and (optionally) persist one team's outputs
pub fn run_batch(request: &BatchRequest) -> Result<BatchResponse> {
    let started = Instant::now();
    let run_id = Uuid::new_v4();

    let result = execute(request, run_id);
    let elapsed = started.elapsed();

    match result {
        Ok((payload, persisted)) => {
            info!(
                team_id = request.team_id,
                run_id = %payload.run_id,
                persisted,
                duration_ms = elapsed.as_millis() as u64,
                "Batch completed"
            );
            Ok(BatchResponse {
                payload,
                persisted,
                duration_ms: elapsed.as_millis() as u64,
            })
        }
        Err(e) => {
            if e.severity().to_tracing_level() == Level::WARN {
                warn!(team_id = request.team_id, %run_id, error = %e, kind = e.kind(), "Batch failed");
            } else {
                error!(team_id = request.team_id, %run_id, error = %e, kind = e.kind(), "Batch failed");
            }
            if request.save_diagnostics {
                let report = failure_report(request, run_id, elapsed, &e);
                if let Err(save_err) = report.save_default() {
                    warn!("Failed to save diagnostic report: {}", save_err);
                }
            }
            Err(e)
        }
    }
}

/// Diagnostic report for a failed run of `request`
pub fn failure_report(
    request: &BatchRequest,
    run_id: Uuid,
    elapsed: Duration,
    error: &SquadRsError,
) -> DiagnosticReport {
    let mut report = DiagnosticReport::new(run_id, request.team_id);
    report.set_duration(elapsed);
    report.add_context("database", request.database.display());
    report.add_context("as_of", request.as_of);
    report.add_context("page_size", request.page_size);
    report.add_context("persist", request.persist);
    report.add_error(error);
    report
}

fn execute(request: &BatchRequest, run_id: Uuid) -> Result<(ComputedPayload, bool)> {
    let span = info_span!("batch", team_id = request.team_id, %run_id, as_of = %request.as_of);
    let _guard = span.enter();

    // Fail before any work when the outputs cannot be written
    let mut db = if request.persist {
        let db = Database::open(&request.database)?;
        db.check_connectivity()?;
        Some(db)
    } else {
        None
    };

    let raw = Database::fetch_raw_tables(&request.database, request.team_id, request.page_size)?;
    if raw.athletes.is_empty() {
        return Err(CalculationError::EmptyRoster {
            team_id: request.team_id,
        }
        .into());
    }

    let mut payload = compute(request.team_id, &raw, request.as_of);
    payload.run_id = run_id;
    for (table, rows) in payload.tables.row_counts() {
        debug!(table, rows, "Computed table");
    }

    let persisted = match db.as_mut() {
        Some(db) => {
            db.replace_outputs(request.team_id, &payload.tables)?;
            true
        }
        None => false,
    };

    Ok((payload, persisted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::tests::{cycle, date, recovery};
    use crate::models::{Athlete, CycleMetrics, RecoveryMetrics};
    use crate::output::MetricPeriod;

    fn squad() -> RawTables {
        let mut tables = RawTables::default();
        for athlete_id in [1, 2] {
            tables.athletes.push(Athlete {
                id: athlete_id,
                team_id: 10,
                name: format!("Player {}", athlete_id),
            });
        }
        let scores = [70.0, 60.0, 50.0, 80.0, 90.0, 65.0, 66.0];
        for (i, score) in scores.iter().enumerate() {
            let id = i as i64 + 1;
            tables.cycles.push(cycle(id, 1, date(2025, 1, 1 + i as u32)));
            tables.recoveries.push(recovery(id, 1, id));
            tables.recovery_metrics.push(RecoveryMetrics {
                recovery_id: id,
                athlete_id: 1,
                recovery_score: Some(*score),
                hrv_rmssd_milli: Some(60.0),
                resting_heart_rate: Some(52.0),
            });
            tables.cycle_metrics.push(CycleMetrics {
                cycle_id: id,
                athlete_id: 1,
                strain: Some(10.5),
            });
        }
        tables
    }

    #[test]
    fn test_compute_produces_every_table() {
        let payload = compute(10, &squad(), date(2025, 1, 7));
        let tables = &payload.tables;

        assert_eq!(payload.athlete_count, 2);
        assert_eq!(tables.recovery_metrics.len(), 2 * 9);
        assert_eq!(tables.workload_metrics.len(), 2 * 9);
        assert_eq!(tables.recovery_metrics_average.len(), 6);
        assert_eq!(tables.recovery_squad_availability.len(), 2 * 6);
        assert_eq!(tables.alert_system.len(), 2);
        assert_eq!(tables.all_time_metrics_averages.len(), 2);
        assert_eq!(tables.all_time_metrics.len(), 7);
        assert_eq!(tables.homepage_line_chart_metrics.len(), 1 + 7 + 7);
        assert_eq!(tables.player_line_chart_metrics.len(), 2 * (1 + 7 + 7));
        assert_eq!(tables.performance_line_chart_metrics.len(), 2 * (7 + 30 + 7));
    }

    #[test]
    fn test_compute_values() {
        let payload = compute(10, &squad(), date(2025, 1, 7));
        let tables = &payload.tables;

        let today = tables
            .recovery_metrics
            .iter()
            .find(|r| r.athlete_id == 1 && r.period == MetricPeriod::Today)
            .unwrap();
        assert_eq!(today.value, 66.0);

        let difference = tables
            .recovery_metrics
            .iter()
            .find(|r| r.athlete_id == 1 && r.period == MetricPeriod::TodayDifference)
            .unwrap();
        assert_eq!(difference.value, 1.0);

        assert_eq!(tables.dbrt.downtime_days, 3);
        assert_eq!(tables.dbrt.total_days, 7);
        assert_eq!(tables.all_time_metrics_averages[0].values.strain, 50.0);
        assert!(tables.alert_system[1].baselines.recovery.three_month_mean == 0.0);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let raw = squad();
        let first = compute(10, &raw, date(2025, 1, 7));
        let second = compute(10, &raw, date(2025, 1, 7));

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(
            serde_json::to_string(&first.tables).unwrap(),
            serde_json::to_string(&second.tables).unwrap()
        );
    }

    #[test]
    fn test_empty_team_is_total() {
        let payload = compute(3, &RawTables::default(), date(2025, 1, 7));

        assert_eq!(payload.athlete_count, 0);
        assert!(payload.tables.recovery_metrics.is_empty());
        assert_eq!(payload.tables.dbrt.total_days, 0);
        assert!(payload.tables.recovery_metrics_average.iter().all(|r| r.value == 0.0));
    }

    #[test]
    fn test_performance_chart_keeps_hrv_in_milliseconds() {
        let payload = compute(10, &squad(), date(2025, 1, 7));

        let week: Vec<_> = payload
            .tables
            .performance_line_chart_metrics
            .iter()
            .filter(|r| r.athlete_id == 1 && r.time_window == Window::Last7Days)
            .collect();
        assert_eq!(week.len(), 7);
        assert!(week.iter().all(|r| r.values.hrv == 60.0));
    }

    #[test]
    fn test_failure_report_describes_request() {
        let mut request = BatchRequest::new(4, "/data/squad.db");
        request.as_of = date(2025, 3, 1);
        request.page_size = 250;
        let run_id = Uuid::new_v4();
        let error = SquadRsError::Calculation(CalculationError::EmptyRoster { team_id: 4 });

        let report = failure_report(&request, run_id, Duration::from_millis(40), &error);

        assert_eq!(report.run_id, run_id);
        assert_eq!(report.team_id, 4);
        assert_eq!(report.duration, Duration::from_millis(40));
        assert!(report
            .context
            .contains(&("as_of".to_string(), "2025-03-01".to_string())));
        assert!(report
            .context
            .contains(&("page_size".to_string(), "250".to_string())));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, "calculation_error");
        assert_eq!(error.severity().to_tracing_level(), Level::WARN);
    }
}
