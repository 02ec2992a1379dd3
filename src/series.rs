//! Chart and long-form series
//!
//! Two kinds of series are produced: rolling chart series with one point per
//! sub-period, and the all-time point series with one row per recorded day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::association::{FactIndex, FactSubset};
use crate::metrics::{self, round_to, Metric};
use crate::models::{AthleteId, DateRange, Sleep};
use crate::period::{PeriodResolver, SubPeriodPlan, Window};
use crate::stats::MetricSeries;

/// Native upper bound of the strain scale
pub const STRAIN_SCALE_MAX: f64 = 21.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Distance from a whole hour below which a duration snaps to it
pub const HOUR_SNAP_TOLERANCE: f64 = 0.001;

/// Strain rescaled from 0-21 to 0-100
pub fn strain_to_display(strain: f64) -> f64 {
    strain * 100.0 / STRAIN_SCALE_MAX
}

/// Milliseconds to fractional hours, snapping values within tolerance of a whole hour
pub fn millis_to_hours(millis: f64) -> f64 {
    let hours = millis / MILLIS_PER_HOUR;
    let whole = hours.round();
    if (hours - whole).abs() < HOUR_SNAP_TOLERANCE {
        whole
    } else {
        hours
    }
}

/// Chart value for a windowed average
pub fn chart_value(metric: Metric, average: f64) -> f64 {
    match metric {
        Metric::Workload => round_to(average, 1),
        m if m.is_duration() => round_to(millis_to_hours(average), 2),
        _ => round_to(average, 0),
    }
}

/// One x-axis point on a rolling chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub range: DateRange,
    pub label: String,
    pub values: BTreeMap<Metric, f64>,
    pub sleep_start: Option<DateTime<Utc>>,
    pub sleep_end: Option<DateTime<Utc>>,
}

impl ChartPoint {
    pub fn value(&self, metric: Metric) -> f64 {
        self.values.get(&metric).copied().unwrap_or(0.0)
    }
}

/// Rolling chart series, points ordered most recent last
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    /// `None` for team-wide series
    pub athlete_id: Option<AthleteId>,
    pub window: Window,
    pub points: Vec<ChartPoint>,
}

/// Every tracked metric for one athlete on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub values: BTreeMap<Metric, Option<f64>>,
    pub sleep_start: Option<DateTime<Utc>>,
    pub sleep_end: Option<DateTime<Utc>>,
}

impl DailyPoint {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied().flatten()
    }
}

/// Builds chart and all-time series over one fact index
pub struct SeriesBuilder<'i, 'a> {
    index: &'i FactIndex<'a>,
    resolver: PeriodResolver,
}

impl<'i, 'a> SeriesBuilder<'i, 'a> {
    pub fn new(index: &'i FactIndex<'a>, resolver: PeriodResolver) -> Self {
        SeriesBuilder { index, resolver }
    }

    /// Averages for each sub-period of `plan`, emitted most recent last
    pub fn sub_period_points(
        &self,
        plan: SubPeriodPlan,
        athletes: &[AthleteId],
        metrics: &[Metric],
        with_sleep: bool,
    ) -> Vec<ChartPoint> {
        let mut points: Vec<ChartPoint> = self
            .resolver
            .sub_periods(plan)
            .into_iter()
            .map(|range| {
                let subset = self.index.associate(&range, athletes);
                let values = metrics::averages(metrics, &subset, self.index)
                    .into_iter()
                    .map(|(metric, avg)| (metric, chart_value(metric, avg)))
                    .collect();
                let sleep = if with_sleep {
                    self.latest_sleep(&subset)
                } else {
                    None
                };

                ChartPoint {
                    range,
                    label: range.label(),
                    values,
                    sleep_start: sleep.map(|s| s.start),
                    sleep_end: sleep.map(|s| s.end),
                }
            })
            .collect();

        points.reverse();
        points
    }

    /// Recovery and workload series for one athlete, or the whole team when `athlete_id` is `None`
    pub fn squad_series(
        &self,
        window: Window,
        athlete_id: Option<AthleteId>,
        roster: &[AthleteId],
    ) -> ChartSeries {
        let athletes = match athlete_id {
            Some(id) => vec![id],
            None => roster.to_vec(),
        };
        let points = self.sub_period_points(
            SubPeriodPlan::for_squad_chart(window),
            &athletes,
            &[Metric::Recovery, Metric::Workload],
            false,
        );

        ChartSeries {
            athlete_id,
            window,
            points,
        }
    }

    /// Every tracked metric plus sleep timing for one athlete
    pub fn performance_series(&self, window: Window, athlete_id: AthleteId) -> ChartSeries {
        let points = self.sub_period_points(
            SubPeriodPlan::for_performance_chart(window),
            &[athlete_id],
            &Metric::TRACKED,
            true,
        );

        ChartSeries {
            athlete_id: Some(athlete_id),
            window,
            points,
        }
    }

    /// One row per distinct cycle date, ascending. Durations are in hours,
    /// strain stays on its native scale.
    pub fn all_time_points(&self, athlete_id: AthleteId) -> Vec<DailyPoint> {
        self.index
            .daily_facts(athlete_id)
            .into_iter()
            .map(|day| {
                let values = Metric::TRACKED
                    .iter()
                    .map(|metric| {
                        let value = match metric {
                            Metric::Workload => day.workload.and_then(Metric::extract_workload),
                            _ => day.recovery.and_then(|r| metric.extract(r, self.index)),
                        };
                        let value = if metric.is_duration() {
                            value.map(millis_to_hours)
                        } else {
                            value
                        };
                        (*metric, value)
                    })
                    .collect();
                let sleep = day.recovery.and_then(|r| self.index.sleep(r));

                DailyPoint {
                    date: day.date,
                    values,
                    sleep_start: sleep.map(|s| s.start),
                    sleep_end: sleep.map(|s| s.end),
                }
            })
            .collect()
    }

    fn latest_sleep(&self, subset: &FactSubset<'a>) -> Option<&'a Sleep> {
        subset
            .recoveries
            .iter()
            .filter_map(|r| self.index.sleep(r))
            .max_by_key(|s| s.end)
    }
}

/// Per-metric series for baselines; strain is rescaled to the display range
pub fn baseline_series(points: &[DailyPoint]) -> BTreeMap<Metric, MetricSeries> {
    let mut by_metric: BTreeMap<Metric, MetricSeries> = BTreeMap::new();

    for point in points {
        for metric in Metric::TRACKED {
            let value = match metric {
                Metric::Workload => point.value(metric).map(strain_to_display),
                _ => point.value(metric),
            };
            by_metric.entry(metric).or_default().push(point.date, value);
        }
    }

    by_metric
}

/// Mean of each metric across all historical rows (strain rescaled,
/// durations to two decimals, everything else to one)
pub fn all_time_averages(points: &[DailyPoint]) -> BTreeMap<Metric, f64> {
    let series = baseline_series(points);

    Metric::TRACKED
        .iter()
        .map(|metric| {
            let values = series
                .get(metric)
                .map(|s| s.values_in(None))
                .unwrap_or_default();
            let mean = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            let places = if metric.is_duration() { 2 } else { 1 };
            (*metric, round_to(mean, places))
        })
        .collect()
}
