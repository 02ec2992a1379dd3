//! Squad availability
//!
//! An athlete is "available" on a day whose recovery score clears the
//! good-recovery threshold. Counts are produced for each window and for
//! the window of equal length immediately before it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::association::{FactIndex, FactSubset};
use crate::metrics::Metric;
use crate::models::{AthleteId, DateRange};
use crate::period::{PeriodSet, Window};

/// Recovery score a day must exceed to count as available
pub const GOOD_RECOVERY_THRESHOLD: f64 = 66.0;

/// Output period names for availability rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AvailabilityPeriod {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "previousDay")]
    PreviousDay,
    #[serde(rename = "last7Days")]
    Last7Days,
    #[serde(rename = "previous7Days")]
    Previous7Days,
    #[serde(rename = "last30Days")]
    Last30Days,
    #[serde(rename = "previous30Days")]
    Previous30Days,
}

impl AvailabilityPeriod {
    pub const ALL: [AvailabilityPeriod; 6] = [
        AvailabilityPeriod::Today,
        AvailabilityPeriod::PreviousDay,
        AvailabilityPeriod::Last7Days,
        AvailabilityPeriod::Previous7Days,
        AvailabilityPeriod::Last30Days,
        AvailabilityPeriod::Previous30Days,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityPeriod::Today => "today",
            AvailabilityPeriod::PreviousDay => "previousDay",
            AvailabilityPeriod::Last7Days => "last7Days",
            AvailabilityPeriod::Previous7Days => "previous7Days",
            AvailabilityPeriod::Last30Days => "last30Days",
            AvailabilityPeriod::Previous30Days => "previous30Days",
        }
    }

    /// Named window this period is derived from
    pub fn window(&self) -> Window {
        match self {
            AvailabilityPeriod::Today | AvailabilityPeriod::PreviousDay => Window::Today,
            AvailabilityPeriod::Last7Days | AvailabilityPeriod::Previous7Days => Window::Last7Days,
            AvailabilityPeriod::Last30Days | AvailabilityPeriod::Previous30Days => {
                Window::Last30Days
            }
        }
    }

    pub fn is_previous(&self) -> bool {
        matches!(
            self,
            AvailabilityPeriod::PreviousDay
                | AvailabilityPeriod::Previous7Days
                | AvailabilityPeriod::Previous30Days
        )
    }

    /// Concrete range for this period
    pub fn range(&self, periods: &PeriodSet) -> DateRange {
        let current = periods.get(self.window());
        if self.is_previous() {
            current.previous()
        } else {
            current
        }
    }
}

/// Good-day counts for one athlete, keyed by period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteAvailability {
    pub athlete_id: AthleteId,
    pub good_days: BTreeMap<AvailabilityPeriod, u32>,
}

impl AthleteAvailability {
    pub fn get(&self, period: AvailabilityPeriod) -> u32 {
        self.good_days.get(&period).copied().unwrap_or(0)
    }
}

/// Number of samples in `subset` whose recovery score exceeds the threshold
pub fn count_good_days(subset: &FactSubset<'_>, index: &FactIndex<'_>) -> u32 {
    subset
        .recoveries
        .iter()
        .filter_map(|r| Metric::Recovery.extract(r, index))
        .filter(|score| *score > GOOD_RECOVERY_THRESHOLD)
        .count() as u32
}

/// Good-day counts for every athlete and every availability period
pub fn squad_availability(
    index: &FactIndex<'_>,
    periods: &PeriodSet,
    athletes: &[AthleteId],
) -> Vec<AthleteAvailability> {
    let ranges: Vec<(AvailabilityPeriod, DateRange)> = AvailabilityPeriod::ALL
        .iter()
        .map(|period| (*period, period.range(periods)))
        .collect();

    athletes
        .iter()
        .map(|athlete_id| {
            let good_days = ranges
                .iter()
                .map(|(period, range)| {
                    let subset = index.associate(range, &[*athlete_id]);
                    (*period, count_good_days(&subset, index))
                })
                .collect();
            AthleteAvailability {
                athlete_id: *athlete_id,
                good_days,
            }
        })
        .collect()
}

/// Denominator for an availability percentage.
///
/// Each record of a 7- or 30-day window stands for a multi-day bucket, so
/// the record count is scaled by the window length.
pub fn availability_total(window: Window, record_count: usize) -> usize {
    match window {
        Window::Last7Days => record_count * 7,
        Window::Last30Days => record_count * 30,
        _ => record_count,
    }
}

/// `round(good / total × 100)`, or 0 when there is no total
pub fn availability_percentage(good_days: u32, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((good_days as f64 / total as f64) * 100.0).round() as u32
}

/// Team-level availability percentage per period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SquadAvailabilitySummary {
    pub percentages: BTreeMap<AvailabilityPeriod, u32>,
}

impl SquadAvailabilitySummary {
    pub fn from_records(records: &[AthleteAvailability]) -> Self {
        let percentages = AvailabilityPeriod::ALL
            .iter()
            .map(|period| {
                let good: u32 = records.iter().map(|r| r.get(*period)).sum();
                let total = availability_total(period.window(), records.len());
                (*period, availability_percentage(good, total))
            })
            .collect();

        SquadAvailabilitySummary { percentages }
    }

    pub fn get(&self, period: AvailabilityPeriod) -> u32 {
        self.percentages.get(&period).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::tests::{cycle, date, recovery};
    use crate::models::{RawTables, RecoveryMetrics};
    use crate::period::PeriodResolver;

    fn week_of_scores(scores: &[f64]) -> RawTables {
        let mut tables = RawTables::default();
        for (i, score) in scores.iter().enumerate() {
            let id = i as i64 + 1;
            tables.cycles.push(cycle(id, 1, date(2025, 1, 1 + i as u32)));
            tables.recoveries.push(recovery(id, 1, id));
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
    fn test_threshold_is_strictly_greater() {
        let tables = week_of_scores(&[70.0, 60.0, 50.0, 80.0, 90.0, 65.0, 66.0]);
        let index = FactIndex::build(&tables);
        let periods = PeriodResolver::new(date(2025, 1, 7)).resolve(tables.earliest_cycle_date());

        let records = squad_availability(&index, &periods, &[1]);

        assert_eq!(records[0].get(AvailabilityPeriod::Last7Days), 3);
        assert_eq!(records[0].get(AvailabilityPeriod::Today), 0);
        assert_eq!(records[0].get(AvailabilityPeriod::PreviousDay), 0);
        assert_eq!(records[0].get(AvailabilityPeriod::Previous7Days), 0);
    }

    #[test]
    fn test_previous_day_counts() {
        let tables = week_of_scores(&[70.0, 60.0, 50.0, 80.0, 90.0, 95.0, 66.0]);
        let index = FactIndex::build(&tables);
        let periods = PeriodResolver::new(date(2025, 1, 7)).resolve(tables.earliest_cycle_date());

        let records = squad_availability(&index, &periods, &[1, 2]);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(AvailabilityPeriod::PreviousDay), 1);
        assert_eq!(records[1].get(AvailabilityPeriod::Last7Days), 0);
    }

    #[test]
    fn test_totals_scale_by_window() {
        assert_eq!(availability_total(Window::Today, 4), 4);
        assert_eq!(availability_total(Window::Last7Days, 4), 28);
        assert_eq!(availability_total(Window::Last30Days, 4), 120);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(availability_percentage(3, 7), 43);
        assert_eq!(availability_percentage(0, 0), 0);
        assert_eq!(availability_percentage(5, 0), 0);
    }

    #[test]
    fn test_summary() {
        let mut a = AthleteAvailability { athlete_id: 1, ..Default::default() };
        a.good_days.insert(AvailabilityPeriod::Last7Days, 5);
        a.good_days.insert(AvailabilityPeriod::Today, 1);
        let b = AthleteAvailability { athlete_id: 2, ..Default::default() };

        let summary = SquadAvailabilitySummary::from_records(&[a, b]);
        // 5 / (2 * 7)
        assert_eq!(summary.get(AvailabilityPeriod::Last7Days), 36);
        assert_eq!(summary.get(AvailabilityPeriod::Today), 50);
        assert_eq!(summary.get(AvailabilityPeriod::Last30Days), 0);
    }
}
