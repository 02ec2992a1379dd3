//! Period resolution
//!
//! Translates named windows ("today", "last 7 days", ...) and chart
//! sub-period plans into concrete inclusive date ranges anchored to an
//! explicit "as of" date.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::DateRange;

/// Number of points on every block-based chart axis
pub const CHART_POINTS: usize = 7;

/// Length of one block on the 30-day charts
pub const MONTH_BLOCK_DAYS: u64 = 30;

/// Named time windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "last7Days")]
    Last7Days,
    #[serde(rename = "last30Days")]
    Last30Days,
    #[serde(rename = "last3Months")]
    Last3Months,
    #[serde(rename = "last6Months")]
    Last6Months,
    #[serde(rename = "allTime")]
    AllTime,
}

impl Window {
    /// Name used in output rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Today => "today",
            Window::Last7Days => "last7Days",
            Window::Last30Days => "last30Days",
            Window::Last3Months => "last3Months",
            Window::Last6Months => "last6Months",
            Window::AllTime => "allTime",
        }
    }

    /// Days subtracted from "today" to reach the window start
    fn lookback_days(&self) -> Option<u64> {
        match self {
            Window::Today => Some(0),
            Window::Last7Days => Some(6),
            Window::Last30Days => Some(29),
            Window::Last3Months => Some(90),
            Window::Last6Months => Some(180),
            Window::AllTime => None,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Window::Today),
            "last7Days" => Ok(Window::Last7Days),
            "last30Days" => Ok(Window::Last30Days),
            "last3Months" => Ok(Window::Last3Months),
            "last6Months" => Ok(Window::Last6Months),
            "allTime" => Ok(Window::AllTime),
            _ => Err(format!("Unknown window: {}", s)),
        }
    }
}

/// Concrete ranges for every named window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSet {
    pub today: DateRange,
    pub last_7_days: DateRange,
    pub last_30_days: DateRange,
    pub last_3_months: DateRange,
    pub last_6_months: DateRange,
    pub all_time: DateRange,
}

impl PeriodSet {
    pub fn get(&self, window: Window) -> DateRange {
        match window {
            Window::Today => self.today,
            Window::Last7Days => self.last_7_days,
            Window::Last30Days => self.last_30_days,
            Window::Last3Months => self.last_3_months,
            Window::Last6Months => self.last_6_months,
            Window::AllTime => self.all_time,
        }
    }
}

/// Granularity of a chart's x-axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPeriodPlan {
    /// `count` single-day windows counting back from today
    Daily { count: usize },
    /// `count` successive blocks of `block_days` days
    Blocks { block_days: u64, count: usize },
}

impl SubPeriodPlan {
    /// Axis plan used by the team and per-player recovery/workload charts
    pub fn for_squad_chart(window: Window) -> SubPeriodPlan {
        match window {
            Window::Today => SubPeriodPlan::Daily { count: 1 },
            Window::Last7Days => SubPeriodPlan::Daily { count: CHART_POINTS },
            _ => SubPeriodPlan::Blocks {
                block_days: MONTH_BLOCK_DAYS,
                count: CHART_POINTS,
            },
        }
    }

    /// Axis plan used by the per-athlete performance charts
    pub fn for_performance_chart(window: Window) -> SubPeriodPlan {
        match window {
            Window::Today => SubPeriodPlan::Daily { count: 1 },
            Window::Last7Days => SubPeriodPlan::Daily { count: 7 },
            Window::Last30Days => SubPeriodPlan::Daily { count: 30 },
            _ => SubPeriodPlan::Blocks {
                block_days: MONTH_BLOCK_DAYS,
                count: CHART_POINTS,
            },
        }
    }
}

/// Resolves windows relative to a fixed anchor date
#[derive(Debug, Clone, Copy)]
pub struct PeriodResolver {
    today: NaiveDate,
}

impl PeriodResolver {
    pub fn new(today: NaiveDate) -> Self {
        PeriodResolver { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Range for a single named window; `allTime` starts at `earliest`
    pub fn window(&self, window: Window, earliest: Option<NaiveDate>) -> DateRange {
        match window.lookback_days() {
            Some(days) => DateRange::new(self.days_back(days), self.today),
            None => {
                let start = earliest.filter(|d| *d <= self.today).unwrap_or(self.today);
                DateRange::new(start, self.today)
            }
        }
    }

    /// Resolve every named window at once
    pub fn resolve(&self, earliest: Option<NaiveDate>) -> PeriodSet {
        PeriodSet {
            today: self.window(Window::Today, earliest),
            last_7_days: self.window(Window::Last7Days, earliest),
            last_30_days: self.window(Window::Last30Days, earliest),
            last_3_months: self.window(Window::Last3Months, earliest),
            last_6_months: self.window(Window::Last6Months, earliest),
            all_time: self.window(Window::AllTime, earliest),
        }
    }

    /// Sub-periods for a chart plan, most recent first
    pub fn sub_periods(&self, plan: SubPeriodPlan) -> Vec<DateRange> {
        match plan {
            SubPeriodPlan::Daily { count } => daily_sub_periods(self.today, count),
            SubPeriodPlan::Blocks { block_days, count } => {
                block_sub_periods(self.today, block_days, count)
            }
        }
    }

    fn days_back(&self, days: u64) -> NaiveDate {
        self.today
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// `count` single-day windows counting back from `today`, most recent first
pub fn daily_sub_periods(today: NaiveDate, count: usize) -> Vec<DateRange> {
    block_sub_periods(today, 1, count)
}

/// `count` successive non-overlapping blocks ending at `today`, most recent first
pub fn block_sub_periods(today: NaiveDate, block_days: u64, count: usize) -> Vec<DateRange> {
    let block_days = block_days.max(1);
    (0..count as u64)
        .map_while(|i| {
            let end = today.checked_sub_days(Days::new(i * block_days))?;
            let start = end.checked_sub_days(Days::new(block_days - 1))?;
            Some(DateRange::new(start, end))
        })
        .collect()
}
