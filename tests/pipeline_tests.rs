//! End-to-end tests of the pure computation over realistic squads

mod common;

use common::{date, squad_fixture};
use squadrs::availability::AvailabilityPeriod;
use squadrs::models::{
    Athlete, Cycle, CycleMetrics, RawTables, Recovery, RecoveryMetrics, ScoreState, SleepStages,
};
use squadrs::output::MetricPeriod;
use squadrs::period::Window;
use squadrs::pipeline::compute;
use std::time::Instant;

fn single_athlete(scores: &[f64]) -> RawTables {
    let mut tables = RawTables::default();
    tables.athletes.push(Athlete {
        id: 1,
        team_id: 1,
        name: "Solo".to_string(),
    });
    for (i, score) in scores.iter().enumerate() {
        let id = i as i64 + 1;
        let day = date(2025, 1, 1 + i as u32);
        tables.cycles.push(Cycle {
            id,
            athlete_id: 1,
            start: day.and_hms_opt(22, 30, 0).unwrap().and_utc(),
        });
        tables.recoveries.push(Recovery {
            id,
            athlete_id: 1,
            cycle_id: id,
            sleep_id: Some(id),
            score_state: ScoreState::Scored,
        });
        tables.recovery_metrics.push(RecoveryMetrics {
            recovery_id: id,
            athlete_id: 1,
            recovery_score: Some(*score),
            hrv_rmssd_milli: None,
            resting_heart_rate: None,
        });
    }
    tables
}

#[test]
fn test_availability_scenario() {
    let raw = single_athlete(&[70.0, 60.0, 50.0, 80.0, 90.0, 65.0, 66.0]);
    let payload = compute(1, &raw, date(2025, 1, 7));

    let last_7 = payload
        .tables
        .recovery_squad_availability
        .iter()
        .find(|r| r.period == AvailabilityPeriod::Last7Days)
        .unwrap();
    assert_eq!(last_7.value, 3);
    // 3 / (1 * 7)
    assert_eq!(payload.availability.get(AvailabilityPeriod::Last7Days), 43);
}

#[test]
fn test_restorative_percentage_is_averaged_per_sample() {
    let mut raw = single_athlete(&[70.0, 70.0]);
    for (id, in_bed) in [(1, 100.0), (2, 200.0)] {
        raw.sleep_stages.push(SleepStages {
            sleep_id: id,
            athlete_id: 1,
            total_in_bed_time_milli: Some(in_bed),
            total_awake_time_milli: Some(0.0),
            total_slow_wave_sleep_time_milli: Some(20.0),
            total_rem_sleep_time_milli: Some(30.0),
        });
    }

    let payload = compute(1, &raw, date(2025, 1, 2));
    let averages = &payload.tables.all_time_metrics_averages[0];
    assert_eq!(averages.values.restorative_sleep, 37.5);
}

#[test]
fn test_strain_is_rescaled_for_all_time_averages() {
    let mut raw = single_athlete(&[70.0]);
    raw.cycle_metrics.push(CycleMetrics {
        cycle_id: 1,
        athlete_id: 1,
        strain: Some(10.5),
    });

    let payload = compute(1, &raw, date(2025, 1, 1));
    assert_eq!(payload.tables.all_time_metrics_averages[0].values.strain, 50.0);
    // per-day rows keep the native scale
    assert_eq!(payload.tables.all_time_metrics[0].values.strain, Some(10.5));
}

#[test]
fn test_sleep_duration_snaps_to_whole_hours() {
    let mut raw = single_athlete(&[70.0, 70.0]);
    for (id, in_bed) in [(1, 14_399_999.0), (2, 14_000_000.0)] {
        raw.sleep_stages.push(SleepStages {
            sleep_id: id,
            athlete_id: 1,
            total_in_bed_time_milli: Some(in_bed),
            total_awake_time_milli: Some(0.0),
            total_slow_wave_sleep_time_milli: None,
            total_rem_sleep_time_milli: None,
        });
    }

    let payload = compute(1, &raw, date(2025, 1, 2));
    let rows = &payload.tables.all_time_metrics;
    assert_eq!(rows[0].values.sleep_duration, Some(4.0));
    let fractional = rows[1].values.sleep_duration.unwrap();
    assert!((fractional - 3.8889).abs() < 0.001);
    assert_ne!(fractional, 4.0);
}

#[test]
fn test_athlete_without_cycles_has_zero_baselines() {
    let mut raw = squad_fixture(1, 2, 30, date(2025, 3, 31));
    raw.athletes.push(Athlete {
        id: 9999,
        team_id: 1,
        name: "New signing".to_string(),
    });

    let payload = compute(1, &raw, date(2025, 3, 31));
    let newcomer = payload
        .tables
        .alert_system
        .iter()
        .find(|r| r.athlete_id == 9999)
        .unwrap();

    assert_eq!(newcomer.baselines.recovery.three_month_mean, 0.0);
    assert_eq!(newcomer.baselines.hrv.all_time_std_dev, 0.0);
    assert_eq!(newcomer.baselines.sleep_duration.all_time_mean, 0.0);

    let others = payload.tables.alert_system.iter().filter(|r| r.athlete_id != 9999);
    for row in others {
        assert!(row.baselines.recovery.all_time_mean > 0.0);
        assert!(row.baselines.recovery.all_time_std_dev >= 0.0);
    }
}

#[test]
fn test_previous_windows_compare_against_adjacent_days() {
    let raw = single_athlete(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 90.0, 80.0, 70.0, 60.0]);
    let payload = compute(1, &raw, date(2025, 1, 14));

    let value = |period: MetricPeriod| {
        payload
            .tables
            .recovery_metrics
            .iter()
            .find(|r| r.period == period)
            .unwrap()
            .value
    };

    // Jan 8..14 vs Jan 1..7
    assert_eq!(value(MetricPeriod::Last7Days), 81.0);
    assert_eq!(value(MetricPeriod::Previous7Days), 40.0);
    assert_eq!(value(MetricPeriod::Last7DaysDifference), 41.0);
    assert_eq!(value(MetricPeriod::Today), 60.0);
    assert_eq!(value(MetricPeriod::PreviousDay), 70.0);
}

#[test]
fn test_chart_series_end_on_today() {
    let raw = squad_fixture(2, 3, 200, date(2025, 6, 30));
    let payload = compute(2, &raw, date(2025, 6, 30));

    let last_week: Vec<_> = payload
        .tables
        .homepage_line_chart_metrics
        .iter()
        .filter(|r| r.time_window == Window::Last7Days)
        .collect();
    assert_eq!(last_week.len(), 7);
    assert_eq!(last_week.last().unwrap().date, "2025-06-30T00:00:00.000Z");
    assert_eq!(last_week.first().unwrap().date, "2025-06-24T00:00:00.000Z");

    let six_months = payload
        .tables
        .performance_line_chart_metrics
        .iter()
        .filter(|r| r.time_window == Window::Last6Months)
        .count();
    assert_eq!(six_months, 3 * 7);
    assert!(payload
        .tables
        .performance_line_chart_metrics
        .iter()
        .all(|r| r.sleep_start.is_some()));
}

#[test]
fn test_compute_is_deterministic_for_a_frozen_date() {
    let raw = squad_fixture(3, 4, 120, date(2025, 5, 1));

    let first = compute(3, &raw, date(2025, 5, 1));
    let second = compute(3, &raw, date(2025, 5, 1));

    assert_eq!(
        serde_json::to_vec(&first.tables).unwrap(),
        serde_json::to_vec(&second.tables).unwrap()
    );
    assert!(first.tables.alert_system.iter().all(|row| {
        row.baselines.recovery.three_month_std_dev >= 0.0 && row.baselines.strain.all_time_std_dev >= 0.0
    }));
}

fn fastest_compute(athletes: i64) -> std::time::Duration {
    let raw = squad_fixture(4, athletes, 120, date(2025, 5, 1));
    (0..3)
        .map(|_| {
            let started = Instant::now();
            compute(4, &raw, date(2025, 5, 1));
            started.elapsed()
        })
        .min()
        .unwrap_or_default()
}

#[test]
fn test_compute_cost_grows_linearly_with_roster() {
    let small = fastest_compute(8);
    let large = fastest_compute(32);

    // four times the athletes; a per-pair scan would cost about sixteen times
    let ratio = large.as_secs_f64() / small.as_secs_f64().max(1e-6);
    assert!(ratio < 8.0, "32 athletes took {:.1}x the time of 8", ratio);
}
