use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Team identifier (roster grouping used to filter every table)
pub type TeamId = i64;
/// Athlete identifier
pub type AthleteId = i64;
/// Cycle identifier, unique per athlete only
pub type CycleId = i64;
/// Recovery identifier, unique per athlete only
pub type RecoveryId = i64;
/// Sleep identifier, unique per athlete only
pub type SleepId = i64;

/// Athlete on a team roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: AthleteId,
    pub team_id: TeamId,
    pub name: String,
}

/// One day's data envelope for one athlete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: CycleId,
    pub athlete_id: AthleteId,

    /// Cycle start timestamp; only its calendar date is used for windowing
    pub start: DateTime<Utc>,
}

impl Cycle {
    /// Calendar date the cycle belongs to
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

/// Scoring state reported for a recovery record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreState {
    Scored,
    PendingScore,
    Unscorable,
}

impl ScoreState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreState::Scored => "SCORED",
            ScoreState::PendingScore => "PENDING_SCORE",
            ScoreState::Unscorable => "UNSCORABLE",
        }
    }
}

impl std::str::FromStr for ScoreState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SCORED" => Ok(ScoreState::Scored),
            "PENDING_SCORE" => Ok(ScoreState::PendingScore),
            "UNSCORABLE" => Ok(ScoreState::Unscorable),
            _ => Err(format!("Unknown score state: {}", s)),
        }
    }
}

/// Recovery fact, referencing a cycle and the sleep that preceded it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recovery {
    pub id: RecoveryId,
    pub athlete_id: AthleteId,
    pub cycle_id: CycleId,
    pub sleep_id: Option<SleepId>,
    pub score_state: ScoreState,
}

/// Scores attached to a recovery record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    pub recovery_id: RecoveryId,
    pub athlete_id: AthleteId,

    /// Composite wellness score (0-100)
    pub recovery_score: Option<f64>,

    /// Heart rate variability (RMSSD) in milliseconds
    pub hrv_rmssd_milli: Option<f64>,

    /// Resting heart rate in beats per minute
    pub resting_heart_rate: Option<f64>,
}

/// Workload attached to a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub cycle_id: CycleId,
    pub athlete_id: AthleteId,

    /// Strain on its native 0-21 scale
    pub strain: Option<f64>,
}

/// Sleep session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sleep {
    pub id: SleepId,
    pub athlete_id: AthleteId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Sleep quality percentages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepPerformance {
    pub sleep_id: SleepId,
    pub athlete_id: AthleteId,
    pub sleep_performance_percentage: Option<f64>,
    pub sleep_consistency_percentage: Option<f64>,
    pub sleep_efficiency_percentage: Option<f64>,
}

/// Sleep stage durations, all in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStages {
    pub sleep_id: SleepId,
    pub athlete_id: AthleteId,
    pub total_in_bed_time_milli: Option<f64>,
    pub total_awake_time_milli: Option<f64>,
    pub total_slow_wave_sleep_time_milli: Option<f64>,
    pub total_rem_sleep_time_milli: Option<f64>,
}

/// Every raw table the engine reads, already filtered to one team
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTables {
    #[serde(default)]
    pub athletes: Vec<Athlete>,
    #[serde(default)]
    pub cycles: Vec<Cycle>,
    #[serde(default)]
    pub recoveries: Vec<Recovery>,
    #[serde(default)]
    pub recovery_metrics: Vec<RecoveryMetrics>,
    #[serde(default)]
    pub cycle_metrics: Vec<CycleMetrics>,
    #[serde(default)]
    pub sleeps: Vec<Sleep>,
    #[serde(default)]
    pub sleep_performance: Vec<SleepPerformance>,
    #[serde(default)]
    pub sleep_stages: Vec<SleepStages>,
}

impl RawTables {
    /// Earliest cycle date across all athletes
    pub fn earliest_cycle_date(&self) -> Option<NaiveDate> {
        self.cycles.iter().map(Cycle::date).min()
    }

    /// Athlete ids in roster order
    pub fn athlete_ids(&self) -> Vec<AthleteId> {
        self.athletes.iter().map(|a| a.id).collect()
    }

    /// Total number of rows across all tables
    pub fn row_count(&self) -> usize {
        self.athletes.len()
            + self.cycles.len()
            + self.recoveries.len()
            + self.recovery_metrics.len()
            + self.cycle_metrics.len()
            + self.sleeps.len()
            + self.sleep_performance.len()
            + self.sleep_stages.len()
    }
}

/// Inclusive calendar-date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Single-day window
    pub fn single(date: NaiveDate) -> Self {
        DateRange { start: date, end: date }
    }

    /// Check if a date falls within this range (both ends inclusive)
    pub fn contains(&self, date: &NaiveDate) -> bool {
        date >= &self.start && date <= &self.end
    }

    /// Number of calendar days covered
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Window of identical length ending the day before this one starts
    pub fn previous(&self) -> DateRange {
        let length = Days::new(self.days().max(1) as u64);
        let end = self.start.checked_sub_days(Days::new(1)).unwrap_or(self.start);
        let start = self.start.checked_sub_days(length).unwrap_or(end);
        DateRange { start, end }
    }

    /// Chart axis label: `MM/DD` for single days, `MM/DD - MM/DD` otherwise
    pub fn label(&self) -> String {
        if self.start == self.end {
            self.start.format("%m/%d").to_string()
        } else {
            format!("{} - {}", self.start.format("%m/%d"), self.end.format("%m/%d"))
        }
    }
}
