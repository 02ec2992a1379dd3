//! Rolling statistics and alert baselines
//!
//! Baselines are the mean and population standard deviation of an
//! athlete's per-day series, once over the three-month window and once
//! over the whole history. Consumers flag values outside mean ± stddev.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::metrics::{round_to, Metric};
use crate::models::{AthleteId, DateRange};

/// Ordered values aligned to ordered dates for one athlete and metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, date: NaiveDate, value: Option<f64>) {
        self.dates.push(date);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numeric values, optionally restricted to a date range. Zeros are kept.
    pub fn values_in(&self, window: Option<&DateRange>) -> Vec<f64> {
        self.dates
            .iter()
            .zip(&self.values)
            .filter(|(date, _)| window.map_or(true, |w| w.contains(date)))
            .filter_map(|(_, value)| value.filter(|v| v.is_finite()))
            .collect()
    }
}

/// Mean and population standard deviation, rounded to one decimal place
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl RollingStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return RollingStats::default();
        }

        let mean = values.iter().mean();
        let std_dev = if values.len() == 1 {
            0.0
        } else {
            values.iter().population_std_dev().max(0.0)
        };

        RollingStats {
            mean: round_to(mean, 1),
            std_dev: round_to(std_dev, 1),
        }
    }
}

/// Statistics for `series`, restricted to `window` when given (all-time otherwise)
pub fn rolling_stats(series: &MetricSeries, window: Option<&DateRange>) -> RollingStats {
    RollingStats::from_values(&series.values_in(window))
}

/// Three-month and all-time statistics for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub three_month_mean: f64,
    pub three_month_std_dev: f64,
    pub all_time_mean: f64,
    pub all_time_std_dev: f64,
}

impl BaselineStats {
    pub fn compute(series: &MetricSeries, three_months: &DateRange) -> Self {
        let recent = rolling_stats(series, Some(three_months));
        let all_time = rolling_stats(series, None);

        BaselineStats {
            three_month_mean: recent.mean,
            three_month_std_dev: recent.std_dev,
            all_time_mean: all_time.mean,
            all_time_std_dev: all_time.std_dev,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == BaselineStats::default()
    }

    /// Whether `value` lies outside the three-month mean ± stddev band
    pub fn is_outside_band(&self, value: f64) -> bool {
        if self.is_zero() {
            return false;
        }
        (value - self.three_month_mean).abs() > self.three_month_std_dev
    }
}

/// Per-athlete baselines for every tracked metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertBaseline {
    pub athlete_id: AthleteId,
    pub metrics: BTreeMap<Metric, BaselineStats>,
}

impl AlertBaseline {
    /// Build from per-metric series; metrics without a series get an all-zero entry
    pub fn compute(
        athlete_id: AthleteId,
        series: &BTreeMap<Metric, MetricSeries>,
        three_months: &DateRange,
    ) -> Self {
        let metrics = Metric::TRACKED
            .iter()
            .map(|metric| {
                let stats = series
                    .get(metric)
                    .map(|s| BaselineStats::compute(s, three_months))
                    .unwrap_or_default();
                (*metric, stats)
            })
            .collect();

        AlertBaseline { athlete_id, metrics }
    }

    pub fn get(&self, metric: Metric) -> BaselineStats {
        self.metrics.get(&metric).copied().unwrap_or_default()
    }

    /// All-zero baselines mean "insufficient data", not "zero tolerance"
    pub fn is_insufficient(&self) -> bool {
        self.metrics.values().all(BaselineStats::is_zero)
    }

    /// Whether a reading for `metric` deviates from the three-month band
    pub fn flags(&self, metric: Metric, value: f64) -> bool {
        !self.is_insufficient() && self.get(metric).is_outside_band(value)
    }
}
