//! Cycle association
//!
//! Joins fact rows to the cycle they belong to and filters them by date
//! range and athlete. Cycle, recovery and sleep identifiers are only unique
//! per athlete, so every lookup is keyed by `(athlete_id, id)`.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{
    AthleteId, Cycle, CycleId, CycleMetrics, DateRange, RawTables, Recovery, RecoveryId,
    RecoveryMetrics, Sleep, SleepId, SleepPerformance, SleepStages,
};

/// Keyed view over a team's raw tables, built once per batch
#[derive(Debug)]
pub struct FactIndex<'a> {
    tables: &'a RawTables,
    cycles: HashMap<(AthleteId, CycleId), &'a Cycle>,
    recovery_metrics: HashMap<(AthleteId, RecoveryId), &'a RecoveryMetrics>,
    sleeps: HashMap<(AthleteId, SleepId), &'a Sleep>,
    sleep_performance: HashMap<(AthleteId, SleepId), &'a SleepPerformance>,
    sleep_stages: HashMap<(AthleteId, SleepId), &'a SleepStages>,
    by_athlete: HashMap<AthleteId, AthleteFacts<'a>>,
}

/// One athlete's facts keyed by cycle date, in table order within a date
#[derive(Debug, Default)]
struct AthleteFacts<'a> {
    cycles: BTreeMap<NaiveDate, &'a Cycle>,
    recoveries: BTreeMap<NaiveDate, Vec<&'a Recovery>>,
    workloads: BTreeMap<NaiveDate, Vec<&'a CycleMetrics>>,
}

/// Fact rows whose cycle falls inside one window
#[derive(Debug, Clone, Default)]
pub struct FactSubset<'a> {
    pub recoveries: Vec<&'a Recovery>,
    pub workloads: Vec<&'a CycleMetrics>,
}

impl<'a> FactSubset<'a> {
    pub fn is_empty(&self) -> bool {
        self.recoveries.is_empty() && self.workloads.is_empty()
    }
}

/// Facts recorded for one athlete on one calendar date
#[derive(Debug, Clone)]
pub struct DailyFacts<'a> {
    pub date: NaiveDate,
    pub cycle: &'a Cycle,
    pub recovery: Option<&'a Recovery>,
    pub workload: Option<&'a CycleMetrics>,
}

impl<'a> FactIndex<'a> {
    pub fn build(tables: &'a RawTables) -> Self {
        let mut index = FactIndex {
            tables,
            cycles: HashMap::with_capacity(tables.cycles.len()),
            recovery_metrics: HashMap::with_capacity(tables.recovery_metrics.len()),
            sleeps: HashMap::with_capacity(tables.sleeps.len()),
            sleep_performance: HashMap::with_capacity(tables.sleep_performance.len()),
            sleep_stages: HashMap::with_capacity(tables.sleep_stages.len()),
            by_athlete: HashMap::new(),
        };

        for cycle in &tables.cycles {
            index.cycles.insert((cycle.athlete_id, cycle.id), cycle);
        }
        for metrics in &tables.recovery_metrics {
            index
                .recovery_metrics
                .insert((metrics.athlete_id, metrics.recovery_id), metrics);
        }
        for sleep in &tables.sleeps {
            index.sleeps.insert((sleep.athlete_id, sleep.id), sleep);
        }
        for performance in &tables.sleep_performance {
            index
                .sleep_performance
                .insert((performance.athlete_id, performance.sleep_id), performance);
        }
        for stages in &tables.sleep_stages {
            index
                .sleep_stages
                .insert((stages.athlete_id, stages.sleep_id), stages);
        }

        for cycle in &tables.cycles {
            let facts = index.by_athlete.entry(cycle.athlete_id).or_default();
            facts.cycles.entry(cycle.date()).or_insert(cycle);
        }
        for recovery in &tables.recoveries {
            if let Some(date) = index.cycle_date(recovery.athlete_id, recovery.cycle_id) {
                let facts = index.by_athlete.entry(recovery.athlete_id).or_default();
                facts.recoveries.entry(date).or_default().push(recovery);
            }
        }
        for workload in &tables.cycle_metrics {
            if let Some(date) = index.cycle_date(workload.athlete_id, workload.cycle_id) {
                let facts = index.by_athlete.entry(workload.athlete_id).or_default();
                facts.workloads.entry(date).or_default().push(workload);
            }
        }

        tracing::debug!(
            cycles = index.cycles.len(),
            recovery_metrics = index.recovery_metrics.len(),
            sleeps = index.sleeps.len(),
            "Fact index built"
        );

        index
    }

    pub fn tables(&self) -> &'a RawTables {
        self.tables
    }

    /// Cycle date for an athlete's cycle id, `None` for orphans
    pub fn cycle_date(&self, athlete_id: AthleteId, cycle_id: CycleId) -> Option<NaiveDate> {
        self.cycles.get(&(athlete_id, cycle_id)).map(|c| c.date())
    }

    pub fn recovery_metrics(&self, recovery: &Recovery) -> Option<&'a RecoveryMetrics> {
        self.recovery_metrics
            .get(&(recovery.athlete_id, recovery.id))
            .copied()
    }

    pub fn sleep(&self, recovery: &Recovery) -> Option<&'a Sleep> {
        let sleep_id = recovery.sleep_id?;
        self.sleeps.get(&(recovery.athlete_id, sleep_id)).copied()
    }

    pub fn sleep_performance(&self, recovery: &Recovery) -> Option<&'a SleepPerformance> {
        let sleep_id = recovery.sleep_id?;
        self.sleep_performance
            .get(&(recovery.athlete_id, sleep_id))
            .copied()
    }

    pub fn sleep_stages(&self, recovery: &Recovery) -> Option<&'a SleepStages> {
        let sleep_id = recovery.sleep_id?;
        self.sleep_stages
            .get(&(recovery.athlete_id, sleep_id))
            .copied()
    }

    /// Facts for the given athletes whose cycle date lies inside `range`.
    ///
    /// One range lookup per requested athlete in its date index.
    pub fn associate(&self, range: &DateRange, athletes: &[AthleteId]) -> FactSubset<'a> {
        let mut subset = FactSubset::default();
        if range.start > range.end {
            return subset;
        }

        let mut seen = HashSet::with_capacity(athletes.len());
        for athlete_id in athletes {
            if !seen.insert(*athlete_id) {
                continue;
            }
            let Some(facts) = self.by_athlete.get(athlete_id) else {
                continue;
            };
            for (_, recoveries) in facts.recoveries.range(range.start..=range.end) {
                subset.recoveries.extend(recoveries.iter().copied());
            }
            for (_, workloads) in facts.workloads.range(range.start..=range.end) {
                subset.workloads.extend(workloads.iter().copied());
            }
        }

        subset
    }

    /// One entry per distinct cycle date the athlete has recorded, ascending
    pub fn daily_facts(&self, athlete_id: AthleteId) -> Vec<DailyFacts<'a>> {
        let Some(facts) = self.by_athlete.get(&athlete_id) else {
            return Vec::new();
        };

        facts
            .cycles
            .iter()
            .map(|(date, cycle)| DailyFacts {
                date: *date,
                cycle: *cycle,
                recovery: facts.recoveries.get(date).and_then(|r| r.first().copied()),
                workload: facts.workloads.get(date).and_then(|w| w.first().copied()),
            })
            .collect()
    }
}
