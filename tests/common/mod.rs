//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use squadrs::models::{
    Athlete, Cycle, CycleMetrics, RawTables, Recovery, RecoveryMetrics, ScoreState, Sleep,
    SleepPerformance, SleepStages, TeamId,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A team of `athletes` with one fully populated cycle per day for `days`
/// days ending on `last_day`. Values vary by athlete and day so that
/// averages and deviations are non-trivial.
pub fn squad_fixture(team_id: TeamId, athletes: i64, days: i64, last_day: NaiveDate) -> RawTables {
    let mut tables = RawTables::default();
    let first_day = last_day - Duration::days(days - 1);

    for athlete_id in 1..=athletes {
        let athlete_id = team_id * 1000 + athlete_id;
        tables.athletes.push(Athlete {
            id: athlete_id,
            team_id,
            name: format!("Athlete {}", athlete_id),
        });

        for day in 0..days {
            let id = day + 1;
            let date = first_day + Duration::days(day);
            let start = date.and_hms_opt(22, 30, 0).unwrap().and_utc();
            let wave = ((day * 7 + athlete_id) % 40) as f64;

            tables.cycles.push(Cycle { id, athlete_id, start });
            tables.recoveries.push(Recovery {
                id,
                athlete_id,
                cycle_id: id,
                sleep_id: Some(id),
                score_state: if day % 17 == 5 {
                    ScoreState::PendingScore
                } else {
                    ScoreState::Scored
                },
            });
            tables.recovery_metrics.push(RecoveryMetrics {
                recovery_id: id,
                athlete_id,
                recovery_score: Some(40.0 + wave),
                hrv_rmssd_milli: Some(45.0 + wave),
                resting_heart_rate: Some(48.0 + (wave / 5.0).floor()),
            });
            tables.cycle_metrics.push(CycleMetrics {
                cycle_id: id,
                athlete_id,
                strain: Some(6.0 + wave / 4.0),
            });
            tables.sleeps.push(Sleep {
                id,
                athlete_id,
                start: start - Duration::hours(24),
                end: start - Duration::hours(16),
            });
            tables.sleep_performance.push(SleepPerformance {
                sleep_id: id,
                athlete_id,
                sleep_performance_percentage: Some(70.0 + wave / 2.0),
                sleep_consistency_percentage: Some(60.0 + wave / 2.0),
                sleep_efficiency_percentage: Some(85.0 + wave / 8.0),
            });
            tables.sleep_stages.push(SleepStages {
                sleep_id: id,
                athlete_id,
                total_in_bed_time_milli: Some(28_800_000.0),
                total_awake_time_milli: Some(1_800_000.0 + wave * 10_000.0),
                total_slow_wave_sleep_time_milli: Some(5_400_000.0),
                total_rem_sleep_time_milli: Some(6_000_000.0 + wave * 20_000.0),
            });
        }
    }

    tables
}
