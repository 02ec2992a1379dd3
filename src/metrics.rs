//! Per-metric extraction and averaging
//!
//! Every metric is read from one of three joins: the recovery metrics
//! (via the recovery id), the cycle workload (via the cycle id) or the
//! sleep tables (via the recovery's sleep id). Derived sleep metrics are
//! computed per sample before averaging.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::association::{FactIndex, FactSubset};
use crate::models::{CycleMetrics, Recovery, ScoreState};

/// Metrics the engine knows how to average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Recovery,
    Workload,
    Hrv,
    Rhr,
    SleepPerformance,
    SleepConsistency,
    SleepEfficiency,
    SleepDuration,
    RestorativeSleepDuration,
    RestorativeSleep,
    /// Alias of the recovery score used by the fitness views
    Fitness,
}

impl Metric {
    /// The ten metrics carried by baselines and the all-time series
    pub const TRACKED: [Metric; 10] = [
        Metric::Recovery,
        Metric::Workload,
        Metric::Rhr,
        Metric::Hrv,
        Metric::SleepPerformance,
        Metric::SleepConsistency,
        Metric::SleepEfficiency,
        Metric::SleepDuration,
        Metric::RestorativeSleepDuration,
        Metric::RestorativeSleep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Recovery => "Recovery",
            Metric::Workload => "Workload",
            Metric::Hrv => "HRV",
            Metric::Rhr => "RHR",
            Metric::SleepPerformance => "Sleep Performance",
            Metric::SleepConsistency => "Sleep Consistency",
            Metric::SleepEfficiency => "Sleep Efficiency",
            Metric::SleepDuration => "Sleep Duration",
            Metric::RestorativeSleepDuration => "Restorative Sleep Duration",
            Metric::RestorativeSleep => "Restorative Sleep",
            Metric::Fitness => "Fitness",
        }
    }

    /// Column name used in output tables
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Recovery | Metric::Fitness => "recovery",
            Metric::Workload => "strain",
            Metric::Hrv => "hrv",
            Metric::Rhr => "rhr",
            Metric::SleepPerformance => "sleep_performance",
            Metric::SleepConsistency => "sleep_consistency",
            Metric::SleepEfficiency => "sleep_efficiency",
            Metric::SleepDuration => "sleep_duration",
            Metric::RestorativeSleepDuration => "restorative_sleep_duration",
            Metric::RestorativeSleep => "restorative_sleep",
        }
    }

    /// Millisecond durations, displayed in hours
    pub fn is_duration(&self) -> bool {
        matches!(self, Metric::SleepDuration | Metric::RestorativeSleepDuration)
    }

    /// Value for one recovery sample, `None` when the join or field is missing
    pub fn extract(&self, recovery: &Recovery, index: &FactIndex<'_>) -> Option<f64> {
        if recovery.score_state != ScoreState::Scored {
            return None;
        }

        let value = match self {
            Metric::Recovery | Metric::Fitness => index.recovery_metrics(recovery)?.recovery_score,
            Metric::Hrv => index.recovery_metrics(recovery)?.hrv_rmssd_milli,
            Metric::Rhr => index.recovery_metrics(recovery)?.resting_heart_rate,
            Metric::SleepPerformance => {
                index.sleep_performance(recovery)?.sleep_performance_percentage
            }
            Metric::SleepConsistency => {
                index.sleep_performance(recovery)?.sleep_consistency_percentage
            }
            Metric::SleepEfficiency => {
                index.sleep_performance(recovery)?.sleep_efficiency_percentage
            }
            Metric::SleepDuration => {
                let stages = index.sleep_stages(recovery)?;
                Some(stages.total_in_bed_time_milli? - stages.total_awake_time_milli?)
            }
            Metric::RestorativeSleepDuration => {
                let stages = index.sleep_stages(recovery)?;
                Some(
                    stages.total_slow_wave_sleep_time_milli?
                        + stages.total_rem_sleep_time_milli?,
                )
            }
            Metric::RestorativeSleep => {
                let stages = index.sleep_stages(recovery)?;
                let in_bed = stages.total_in_bed_time_milli?;
                if in_bed <= 0.0 {
                    return None;
                }
                let restorative =
                    stages.total_slow_wave_sleep_time_milli? + stages.total_rem_sleep_time_milli?;
                Some(restorative / in_bed * 100.0)
            }
            Metric::Workload => None,
        };

        value.filter(|v| v.is_finite())
    }

    /// Strain for one workload sample
    pub fn extract_workload(workload: &CycleMetrics) -> Option<f64> {
        workload.strain.filter(|v| v.is_finite())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', " ").as_str() {
            "recovery" => Ok(Metric::Recovery),
            "workload" | "strain" => Ok(Metric::Workload),
            "hrv" => Ok(Metric::Hrv),
            "rhr" => Ok(Metric::Rhr),
            "sleep performance" => Ok(Metric::SleepPerformance),
            "sleep consistency" => Ok(Metric::SleepConsistency),
            "sleep efficiency" => Ok(Metric::SleepEfficiency),
            "sleep duration" => Ok(Metric::SleepDuration),
            "restorative sleep duration" => Ok(Metric::RestorativeSleepDuration),
            "restorative sleep" => Ok(Metric::RestorativeSleep),
            "fitness" => Ok(Metric::Fitness),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// Mean of a metric over a filtered fact subset.
///
/// Missing samples and zero readings are skipped; a subset with no usable
/// samples averages to `0.0` so that missing data never raises an alert.
pub fn average(metric: Metric, subset: &FactSubset<'_>, index: &FactIndex<'_>) -> f64 {
    let values: Vec<f64> = match metric {
        Metric::Workload => subset
            .workloads
            .iter()
            .filter_map(|w| Metric::extract_workload(w))
            .collect(),
        _ => subset
            .recoveries
            .iter()
            .filter_map(|r| metric.extract(r, index))
            .collect(),
    };

    mean_of_nonzero(&values)
}

/// Averages for several metrics over the same subset
pub fn averages(
    metrics: &[Metric],
    subset: &FactSubset<'_>,
    index: &FactIndex<'_>,
) -> Vec<(Metric, f64)> {
    metrics
        .iter()
        .map(|metric| (*metric, average(*metric, subset, index)))
        .collect()
}

fn mean_of_nonzero(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| **v != 0.0)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    let rounded = (value * factor).round() / factor;
    // avoid emitting "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::tests::{cycle, date, recovery};
    use crate::models::{DateRange, RawTables, RecoveryMetrics, SleepPerformance, SleepStages};

    fn stages(sleep_id: i64, in_bed: f64, awake: f64, sws: f64, rem: f64) -> SleepStages {
        SleepStages {
            sleep_id,
            athlete_id: 1,
            total_in_bed_time_milli: Some(in_bed),
            total_awake_time_milli: Some(awake),
            total_slow_wave_sleep_time_milli: Some(sws),
            total_rem_sleep_time_milli: Some(rem),
        }
    }

    fn scores(recovery_id: i64, score: f64, hrv: f64, rhr: f64) -> RecoveryMetrics {
        RecoveryMetrics {
            recovery_id,
            athlete_id: 1,
            recovery_score: Some(score),
            hrv_rmssd_milli: Some(hrv),
            resting_heart_rate: Some(rhr),
        }
    }

    fn sample_tables() -> RawTables {
        RawTables {
            cycles: vec![cycle(10, 1, date(2025, 1, 1)), cycle(11, 1, date(2025, 1, 2))],
            recoveries: vec![recovery(1, 1, 10), recovery(2, 1, 11)],
            recovery_metrics: vec![scores(1, 80.0, 60.0, 50.0), scores(2, 60.0, 40.0, 54.0)],
            cycle_metrics: vec![
                CycleMetrics { cycle_id: 10, athlete_id: 1, strain: Some(10.0) },
                CycleMetrics { cycle_id: 11, athlete_id: 1, strain: Some(14.0) },
            ],
            sleep_performance: vec![SleepPerformance {
                sleep_id: 1,
                athlete_id: 1,
                sleep_performance_percentage: Some(90.0),
                sleep_consistency_percentage: Some(70.0),
                sleep_efficiency_percentage: Some(95.0),
            }],
            sleep_stages: vec![stages(1, 100.0, 10.0, 30.0, 20.0), stages(2, 200.0, 20.0, 25.0, 25.0)],
            ..RawTables::default()
        }
    }

    fn whole_range() -> DateRange {
        DateRange::new(date(2025, 1, 1), date(2025, 1, 31))
    }

    #[test]
    fn test_recovery_family() {
        let tables = sample_tables();
        let index = FactIndex::build(&tables);
        let subset = index.associate(&whole_range(), &[1]);

        assert_eq!(average(Metric::Recovery, &subset, &index), 70.0);
        assert_eq!(average(Metric::Fitness, &subset, &index), 70.0);
        assert_eq!(average(Metric::Hrv, &subset, &index), 50.0);
        assert_eq!(average(Metric::Rhr, &subset, &index), 52.0);
        assert_eq!(average(Metric::Workload, &subset, &index), 12.0);
    }

    #[test]
    fn test_sleep_family() {
        let tables = sample_tables();
        let index = FactIndex::build(&tables);
        let subset = index.associate(&whole_range(), &[1]);

        // only sleep 1 has performance data
        assert_eq!(average(Metric::SleepPerformance, &subset, &index), 90.0);
        assert_eq!(average(Metric::SleepEfficiency, &subset, &index), 95.0);
        // (90 + 180) / 2
        assert_eq!(average(Metric::SleepDuration, &subset, &index), 135.0);
        assert_eq!(average(Metric::RestorativeSleepDuration, &subset, &index), 50.0);
    }

    #[test]
    fn test_restorative_percentage_is_per_sample() {
        let tables = sample_tables();
        let index = FactIndex::build(&tables);
        let subset = index.associate(&whole_range(), &[1]);

        // 50/100 = 50%, 50/200 = 25% -> 37.5%, not 100/300 = 33.3%
        assert_eq!(average(Metric::RestorativeSleep, &subset, &index), 37.5);
    }

    #[test]
    fn test_empty_subset_averages_to_zero() {
        let tables = RawTables::default();
        let index = FactIndex::build(&tables);
        let subset = FactSubset::default();

        for metric in Metric::TRACKED {
            let value = average(metric, &subset, &index);
            assert_eq!(value, 0.0);
            assert!(!value.is_nan());
        }
    }

    #[test]
    fn test_unscored_and_zero_samples_are_skipped() {
        let mut tables = sample_tables();
        tables.recoveries[1].score_state = ScoreState::PendingScore;
        tables.cycle_metrics[1].strain = Some(0.0);
        let index = FactIndex::build(&tables);
        let subset = index.associate(&whole_range(), &[1]);

        assert_eq!(average(Metric::Recovery, &subset, &index), 80.0);
        assert_eq!(average(Metric::Workload, &subset, &index), 10.0);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("HRV".parse::<Metric>().unwrap(), Metric::Hrv);
        assert_eq!(
            "restorative_sleep_duration".parse::<Metric>().unwrap(),
            Metric::RestorativeSleepDuration
        );
        assert!("vo2".parse::<Metric>().is_err());
        assert_eq!(Metric::TRACKED.len(), 10);
        assert!(!Metric::TRACKED.contains(&Metric::Fitness));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.14159, 1), 3.1);
        assert_eq!(round_to(2.675, 0), 3.0);
        assert_eq!(round_to(-0.04, 1), 0.0);
    }
}
