//! Output assembly
//!
//! Flattens the per-athlete, per-window structures into the row sets of the
//! computed tables. Every row carries the team id handed to the assembler;
//! dates and timestamps are rendered as canonical UTC strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::association::FactIndex;
use crate::availability::{AthleteAvailability, AvailabilityPeriod};
use crate::metrics::{self, Metric};
use crate::models::{AthleteId, TeamId};
use crate::period::{PeriodSet, Window};
use crate::series::{chart_value, ChartSeries, DailyPoint};
use crate::stats::{AlertBaseline, BaselineStats};

/// Recovery score below which a day counts as downtime
pub const DOWNTIME_THRESHOLD: f64 = 66.0;

/// Canonical timestamp string (RFC 3339, milliseconds, `Z`)
pub fn canonical_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Canonical timestamp for midnight UTC of `date`
pub fn canonical_date(date: &NaiveDate) -> String {
    canonical_timestamp(&date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Period names of the recovery/workload comparison tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricPeriod {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "previousDay")]
    PreviousDay,
    #[serde(rename = "todayDifference")]
    TodayDifference,
    #[serde(rename = "last7Days")]
    Last7Days,
    #[serde(rename = "previous7Days")]
    Previous7Days,
    #[serde(rename = "last7DaysDifference")]
    Last7DaysDifference,
    #[serde(rename = "last30Days")]
    Last30Days,
    #[serde(rename = "previous30Days")]
    Previous30Days,
    #[serde(rename = "last30DaysDifference")]
    Last30DaysDifference,
}

impl MetricPeriod {
    pub const ALL: [MetricPeriod; 9] = [
        MetricPeriod::Today,
        MetricPeriod::PreviousDay,
        MetricPeriod::TodayDifference,
        MetricPeriod::Last7Days,
        MetricPeriod::Previous7Days,
        MetricPeriod::Last7DaysDifference,
        MetricPeriod::Last30Days,
        MetricPeriod::Previous30Days,
        MetricPeriod::Last30DaysDifference,
    ];

    /// Periods carried by the team-average tables
    pub const AVERAGED: [MetricPeriod; 6] = [
        MetricPeriod::Today,
        MetricPeriod::TodayDifference,
        MetricPeriod::Last7Days,
        MetricPeriod::Last7DaysDifference,
        MetricPeriod::Last30Days,
        MetricPeriod::Last30DaysDifference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricPeriod::Today => "today",
            MetricPeriod::PreviousDay => "previousDay",
            MetricPeriod::TodayDifference => "todayDifference",
            MetricPeriod::Last7Days => "last7Days",
            MetricPeriod::Previous7Days => "previous7Days",
            MetricPeriod::Last7DaysDifference => "last7DaysDifference",
            MetricPeriod::Last30Days => "last30Days",
            MetricPeriod::Previous30Days => "previous30Days",
            MetricPeriod::Last30DaysDifference => "last30DaysDifference",
        }
    }

    /// (window, current, previous, difference) triples
    fn comparisons() -> [(Window, MetricPeriod, MetricPeriod, MetricPeriod); 3] {
        [
            (
                Window::Today,
                MetricPeriod::Today,
                MetricPeriod::PreviousDay,
                MetricPeriod::TodayDifference,
            ),
            (
                Window::Last7Days,
                MetricPeriod::Last7Days,
                MetricPeriod::Previous7Days,
                MetricPeriod::Last7DaysDifference,
            ),
            (
                Window::Last30Days,
                MetricPeriod::Last30Days,
                MetricPeriod::Previous30Days,
                MetricPeriod::Last30DaysDifference,
            ),
        ]
    }
}

/// Current, previous and difference values for one athlete and metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthletePeriodValues {
    pub athlete_id: AthleteId,
    pub values: BTreeMap<MetricPeriod, f64>,
}

impl AthletePeriodValues {
    pub fn compute(
        index: &FactIndex<'_>,
        periods: &PeriodSet,
        athlete_id: AthleteId,
        metric: Metric,
    ) -> Self {
        let mut values = BTreeMap::new();

        for (window, current_period, previous_period, difference_period) in
            MetricPeriod::comparisons()
        {
            let current_range = periods.get(window);
            let current = index.associate(&current_range, &[athlete_id]);
            let previous = index.associate(&current_range.previous(), &[athlete_id]);

            let current = chart_value(metric, metrics::average(metric, &current, index));
            let previous = chart_value(metric, metrics::average(metric, &previous, index));

            values.insert(current_period, current);
            values.insert(previous_period, previous);
            values.insert(difference_period, chart_value(metric, current - previous));
        }

        AthletePeriodValues { athlete_id, values }
    }

    pub fn get(&self, period: MetricPeriod) -> f64 {
        self.values.get(&period).copied().unwrap_or(0.0)
    }
}

/// Value per tracked metric, serialized as one column per metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedValues<T> {
    pub recovery: T,
    pub strain: T,
    pub rhr: T,
    pub hrv: T,
    pub sleep_performance: T,
    pub sleep_consistency: T,
    pub sleep_efficiency: T,
    pub sleep_duration: T,
    pub restorative_sleep_duration: T,
    pub restorative_sleep: T,
}

impl<T: Clone> TrackedValues<T> {
    pub fn from_fn(mut f: impl FnMut(Metric) -> T) -> Self {
        TrackedValues {
            recovery: f(Metric::Recovery),
            strain: f(Metric::Workload),
            rhr: f(Metric::Rhr),
            hrv: f(Metric::Hrv),
            sleep_performance: f(Metric::SleepPerformance),
            sleep_consistency: f(Metric::SleepConsistency),
            sleep_efficiency: f(Metric::SleepEfficiency),
            sleep_duration: f(Metric::SleepDuration),
            restorative_sleep_duration: f(Metric::RestorativeSleepDuration),
            restorative_sleep: f(Metric::RestorativeSleep),
        }
    }

    pub fn get(&self, metric: Metric) -> T {
        match metric {
            Metric::Recovery | Metric::Fitness => self.recovery.clone(),
            Metric::Workload => self.strain.clone(),
            Metric::Rhr => self.rhr.clone(),
            Metric::Hrv => self.hrv.clone(),
            Metric::SleepPerformance => self.sleep_performance.clone(),
            Metric::SleepConsistency => self.sleep_consistency.clone(),
            Metric::SleepEfficiency => self.sleep_efficiency.clone(),
            Metric::SleepDuration => self.sleep_duration.clone(),
            Metric::RestorativeSleepDuration => self.restorative_sleep_duration.clone(),
            Metric::RestorativeSleep => self.restorative_sleep.clone(),
        }
    }
}

/// `recovery_metrics` / `workload_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetricRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    pub period: MetricPeriod,
    pub value: f64,
}

/// `recovery_metrics_average` / `workload_metrics_average`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAverageRow {
    pub team_id: TeamId,
    pub period: MetricPeriod,
    pub value: f64,
}

/// `player_line_chart_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLineChartRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    pub time_window: Window,
    pub label: String,
    pub date: String,
    pub recovery: f64,
    pub workload: f64,
}

/// `homepage_line_chart_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomepageLineChartRow {
    pub team_id: TeamId,
    pub time_window: Window,
    pub label: String,
    pub date: String,
    pub recovery: f64,
    pub workload: f64,
}

/// `performance_line_chart_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceLineChartRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    pub time_window: Window,
    pub label: String,
    pub date: String,
    #[serde(flatten)]
    pub values: TrackedValues<f64>,
    pub sleep_start: Option<String>,
    pub sleep_end: Option<String>,
}

/// `all_time_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllTimeMetricsRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    pub date: String,
    #[serde(flatten)]
    pub values: TrackedValues<Option<f64>>,
    pub sleep_start: Option<String>,
    pub sleep_end: Option<String>,
}

/// `all_time_metrics_averages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllTimeAveragesRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    #[serde(flatten)]
    pub values: TrackedValues<f64>,
}

/// `recovery_squad_availability`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadAvailabilityRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    pub period: AvailabilityPeriod,
    pub value: u32,
}

/// `alert_system`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSystemRow {
    pub team_id: TeamId,
    pub athlete_id: AthleteId,
    pub baselines: TrackedValues<BaselineStats>,
}

/// `dbrt`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dbrt {
    pub team_id: TeamId,
    pub downtime_days: u32,
    pub total_days: u32,
}

/// Every computed table of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTables {
    pub recovery_metrics: Vec<PeriodMetricRow>,
    pub workload_metrics: Vec<PeriodMetricRow>,
    pub recovery_metrics_average: Vec<PeriodAverageRow>,
    pub workload_metrics_average: Vec<PeriodAverageRow>,
    pub player_line_chart_metrics: Vec<PlayerLineChartRow>,
    pub performance_line_chart_metrics: Vec<PerformanceLineChartRow>,
    pub all_time_metrics: Vec<AllTimeMetricsRow>,
    pub all_time_metrics_averages: Vec<AllTimeAveragesRow>,
    pub homepage_line_chart_metrics: Vec<HomepageLineChartRow>,
    pub recovery_squad_availability: Vec<SquadAvailabilityRow>,
    pub alert_system: Vec<AlertSystemRow>,
    pub dbrt: Dbrt,
}

impl OutputTables {
    /// Row count per table name
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("recovery_metrics", self.recovery_metrics.len()),
            ("workload_metrics", self.workload_metrics.len()),
            ("recovery_metrics_average", self.recovery_metrics_average.len()),
            ("workload_metrics_average", self.workload_metrics_average.len()),
            ("player_line_chart_metrics", self.player_line_chart_metrics.len()),
            ("performance_line_chart_metrics", self.performance_line_chart_metrics.len()),
            ("all_time_metrics", self.all_time_metrics.len()),
            ("all_time_metrics_averages", self.all_time_metrics_averages.len()),
            ("homepage_line_chart_metrics", self.homepage_line_chart_metrics.len()),
            ("recovery_squad_availability", self.recovery_squad_availability.len()),
            ("alert_system", self.alert_system.len()),
            ("dbrt", 1),
        ]
    }
}

/// Builds output rows for one team
#[derive(Debug, Clone, Copy)]
pub struct OutputAssembler {
    team_id: TeamId,
}

impl OutputAssembler {
    pub fn new(team_id: TeamId) -> Self {
        OutputAssembler { team_id }
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn period_metric_rows(&self, values: &[AthletePeriodValues]) -> Vec<PeriodMetricRow> {
        values
            .iter()
            .flat_map(|athlete| {
                MetricPeriod::ALL.into_iter().map(move |period| PeriodMetricRow {
                    team_id: self.team_id,
                    athlete_id: athlete.athlete_id,
                    period,
                    value: athlete.get(period),
                })
            })
            .collect()
    }

    /// Team rollup: mean over athletes with data, differences of the rolled-up means
    pub fn period_average_rows(
        &self,
        metric: Metric,
        values: &[AthletePeriodValues],
    ) -> Vec<PeriodAverageRow> {
        let team_mean = |period: MetricPeriod| {
            let present: Vec<f64> = values
                .iter()
                .map(|v| v.get(period))
                .filter(|v| *v != 0.0)
                .collect();
            if present.is_empty() {
                0.0
            } else {
                chart_value(metric, present.iter().sum::<f64>() / present.len() as f64)
            }
        };

        let mut rolled_up = BTreeMap::new();
        for (_, current, previous, difference) in MetricPeriod::comparisons() {
            let current_mean = team_mean(current);
            let previous_mean = team_mean(previous);
            rolled_up.insert(current, current_mean);
            rolled_up.insert(difference, chart_value(metric, current_mean - previous_mean));
        }

        MetricPeriod::AVERAGED
            .iter()
            .map(|period| PeriodAverageRow {
                team_id: self.team_id,
                period: *period,
                value: rolled_up.get(period).copied().unwrap_or(0.0),
            })
            .collect()
    }

    pub fn player_chart_rows(&self, series: &[ChartSeries]) -> Vec<PlayerLineChartRow> {
        series
            .iter()
            .filter_map(|s| s.athlete_id.map(|athlete_id| (athlete_id, s)))
            .flat_map(|(athlete_id, s)| {
                s.points.iter().map(move |point| PlayerLineChartRow {
                    team_id: self.team_id,
                    athlete_id,
                    time_window: s.window,
                    label: point.label.clone(),
                    date: canonical_date(&point.range.end),
                    recovery: point.value(Metric::Recovery),
                    workload: point.value(Metric::Workload),
                })
            })
            .collect()
    }

    pub fn homepage_chart_rows(&self, series: &[ChartSeries]) -> Vec<HomepageLineChartRow> {
        series
            .iter()
            .flat_map(|s| {
                s.points.iter().map(move |point| HomepageLineChartRow {
                    team_id: self.team_id,
                    time_window: s.window,
                    label: point.label.clone(),
                    date: canonical_date(&point.range.end),
                    recovery: point.value(Metric::Recovery),
                    workload: point.value(Metric::Workload),
                })
            })
            .collect()
    }

    pub fn performance_chart_rows(&self, series: &[ChartSeries]) -> Vec<PerformanceLineChartRow> {
        series
            .iter()
            .filter_map(|s| s.athlete_id.map(|athlete_id| (athlete_id, s)))
            .flat_map(|(athlete_id, s)| {
                s.points.iter().map(move |point| PerformanceLineChartRow {
                    team_id: self.team_id,
                    athlete_id,
                    time_window: s.window,
                    label: point.label.clone(),
                    date: canonical_date(&point.range.end),
                    values: TrackedValues::from_fn(|metric| point.value(metric)),
                    sleep_start: point.sleep_start.as_ref().map(canonical_timestamp),
                    sleep_end: point.sleep_end.as_ref().map(canonical_timestamp),
                })
            })
            .collect()
    }

    pub fn all_time_rows(&self, athlete_id: AthleteId, points: &[DailyPoint]) -> Vec<AllTimeMetricsRow> {
        points
            .iter()
            .map(|point| AllTimeMetricsRow {
                team_id: self.team_id,
                athlete_id,
                date: canonical_date(&point.date),
                values: TrackedValues::from_fn(|metric| point.value(metric)),
                sleep_start: point.sleep_start.as_ref().map(canonical_timestamp),
                sleep_end: point.sleep_end.as_ref().map(canonical_timestamp),
            })
            .collect()
    }

    pub fn all_time_average_row(
        &self,
        athlete_id: AthleteId,
        averages: &BTreeMap<Metric, f64>,
    ) -> AllTimeAveragesRow {
        AllTimeAveragesRow {
            team_id: self.team_id,
            athlete_id,
            values: TrackedValues::from_fn(|metric| averages.get(&metric).copied().unwrap_or(0.0)),
        }
    }

    pub fn availability_rows(&self, records: &[AthleteAvailability]) -> Vec<SquadAvailabilityRow> {
        records
            .iter()
            .flat_map(|record| {
                AvailabilityPeriod::ALL.into_iter().map(move |period| SquadAvailabilityRow {
                    team_id: self.team_id,
                    athlete_id: record.athlete_id,
                    period,
                    value: record.get(period),
                })
            })
            .collect()
    }

    pub fn alert_rows(&self, baselines: &[AlertBaseline]) -> Vec<AlertSystemRow> {
        baselines
            .iter()
            .map(|baseline| AlertSystemRow {
                team_id: self.team_id,
                athlete_id: baseline.athlete_id,
                baselines: TrackedValues::from_fn(|metric| baseline.get(metric)),
            })
            .collect()
    }

    /// Downtime (recovery below threshold) versus all scored samples
    pub fn downtime<'p>(&self, points: impl IntoIterator<Item = &'p DailyPoint>) -> Dbrt {
        let (downtime_days, total_days) = points
            .into_iter()
            .filter_map(|p| p.value(Metric::Recovery))
            .fold((0u32, 0u32), |(down, total), score| {
                (down + u32::from(score < DOWNTIME_THRESHOLD), total + 1)
            });

        Dbrt {
            team_id: self.team_id,
            downtime_days,
            total_days,
        }
    }
}
