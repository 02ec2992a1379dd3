use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, Result, SquadRsError};
use crate::metrics::Metric;
use crate::models::{
    Athlete, Cycle, CycleMetrics, RawTables, Recovery, RecoveryMetrics, ScoreState, Sleep,
    SleepPerformance, SleepStages, TeamId,
};
use crate::output::{canonical_timestamp, Dbrt, OutputTables};

/// Computed tables, in write order
pub const OUTPUT_TABLES: [&str; 12] = [
    "recovery_metrics",
    "workload_metrics",
    "recovery_metrics_average",
    "workload_metrics_average",
    "player_line_chart_metrics",
    "performance_line_chart_metrics",
    "all_time_metrics",
    "all_time_metrics_averages",
    "homepage_line_chart_metrics",
    "recovery_squad_availability",
    "alert_system",
    "dbrt",
];

const BASELINE_SUFFIXES: [&str; 4] = [
    "three_month_mean",
    "three_month_std_dev",
    "all_time_mean",
    "all_time_std_dev",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection and management
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create or open a database at the specified path and ensure the schema exists
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut db = Self { conn };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an existing database without creating it or touching the schema
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_existing(db_path.as_ref())?;
        Ok(Self { conn })
    }

    /// In-memory database with the full schema
    pub fn in_memory() -> Result<Self> {
        let mut db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Raw connection, for ad-hoc queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&mut self) -> Result<()> {
        // Enable WAL mode so the parallel readers don't block each other
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS athletes (
                id INTEGER PRIMARY KEY,
                team_id INTEGER NOT NULL,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cycles (
                id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                PRIMARY KEY (athlete_id, id)
            );

            CREATE TABLE IF NOT EXISTS recoveries (
                id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                cycle_id INTEGER NOT NULL,
                sleep_id INTEGER,
                score_state TEXT NOT NULL,
                PRIMARY KEY (athlete_id, id)
            );

            CREATE TABLE IF NOT EXISTS recovery_facts (
                recovery_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                recovery_score REAL,
                hrv_rmssd_milli REAL,
                resting_heart_rate REAL,
                PRIMARY KEY (athlete_id, recovery_id)
            );

            CREATE TABLE IF NOT EXISTS cycle_metrics (
                cycle_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                strain REAL,
                PRIMARY KEY (athlete_id, cycle_id)
            );

            CREATE TABLE IF NOT EXISTS sleeps (
                id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                PRIMARY KEY (athlete_id, id)
            );

            CREATE TABLE IF NOT EXISTS sleep_performance (
                sleep_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                sleep_performance_percentage REAL,
                sleep_consistency_percentage REAL,
                sleep_efficiency_percentage REAL,
                PRIMARY KEY (athlete_id, sleep_id)
            );

            CREATE TABLE IF NOT EXISTS sleep_stages (
                sleep_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                total_in_bed_time_milli REAL,
                total_awake_time_milli REAL,
                total_slow_wave_sleep_time_milli REAL,
                total_rem_sleep_time_milli REAL,
                PRIMARY KEY (athlete_id, sleep_id)
            );

            CREATE INDEX IF NOT EXISTS idx_athletes_team ON athletes (team_id);

            CREATE TABLE IF NOT EXISTS recovery_metrics (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                period TEXT NOT NULL,
                value REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workload_metrics (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                period TEXT NOT NULL,
                value REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS recovery_metrics_average (
                team_id INTEGER NOT NULL,
                period TEXT NOT NULL,
                value REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workload_metrics_average (
                team_id INTEGER NOT NULL,
                period TEXT NOT NULL,
                value REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS player_line_chart_metrics (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                time_window TEXT NOT NULL,
                label TEXT NOT NULL,
                date TEXT NOT NULL,
                recovery REAL NOT NULL,
                workload REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS homepage_line_chart_metrics (
                team_id INTEGER NOT NULL,
                time_window TEXT NOT NULL,
                label TEXT NOT NULL,
                date TEXT NOT NULL,
                recovery REAL NOT NULL,
                workload REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS recovery_squad_availability (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                period TEXT NOT NULL,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dbrt (
                team_id INTEGER PRIMARY KEY,
                downtime_days INTEGER NOT NULL,
                total_days INTEGER NOT NULL
            );
            "#,
        )?;

        // Tables with one column per tracked metric
        let tracked = tracked_columns();
        let baseline = baseline_columns();
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS performance_line_chart_metrics (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                time_window TEXT NOT NULL,
                label TEXT NOT NULL,
                date TEXT NOT NULL,
                {perf},
                sleep_start TEXT,
                sleep_end TEXT
            );

            CREATE TABLE IF NOT EXISTS all_time_metrics (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                {all_time},
                sleep_start TEXT,
                sleep_end TEXT
            );

            CREATE TABLE IF NOT EXISTS all_time_metrics_averages (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                {perf}
            );

            CREATE TABLE IF NOT EXISTS alert_system (
                team_id INTEGER NOT NULL,
                athlete_id INTEGER NOT NULL,
                {alerts}
            );
            "#,
            perf = column_defs(&tracked, "REAL NOT NULL"),
            all_time = column_defs(&tracked, "REAL"),
            alerts = column_defs(&baseline, "REAL NOT NULL"),
        ))?;

        for table in OUTPUT_TABLES.iter().filter(|t| **t != "dbrt") {
            self.conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_team ON {table} (team_id)"),
                [],
            )?;
        }

        Ok(())
    }

    /// Pre-flight check against the `dbrt` output table
    pub fn check_connectivity(&self) -> Result<()> {
        self.conn
            .query_row("SELECT COUNT(*) FROM dbrt", [], |row| row.get::<_, i64>(0))
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        debug!("Database pre-flight check passed");
        Ok(())
    }

    /// Seed the input tables for one team, replacing rows with the same keys
    pub fn load_raw_tables(&mut self, team_id: TeamId, tables: &RawTables) -> Result<usize> {
        if let Some(athlete) = tables.athletes.iter().find(|a| a.team_id != team_id) {
            return Err(SquadRsError::Validation(format!(
                "Athlete {} belongs to team {}, not team {}",
                athlete.id, athlete.team_id, team_id
            )));
        }

        let tx = self.conn.transaction()?;

        for a in &tables.athletes {
            tx.execute(
                "INSERT OR REPLACE INTO athletes (id, team_id, name) VALUES (?1, ?2, ?3)",
                params![a.id, a.team_id, a.name],
            )?;
        }
        for c in &tables.cycles {
            tx.execute(
                "INSERT OR REPLACE INTO cycles (id, athlete_id, start_time) VALUES (?1, ?2, ?3)",
                params![c.id, c.athlete_id, canonical_timestamp(&c.start)],
            )?;
        }
        for r in &tables.recoveries {
            tx.execute(
                "INSERT OR REPLACE INTO recoveries (id, athlete_id, cycle_id, sleep_id, score_state)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![r.id, r.athlete_id, r.cycle_id, r.sleep_id, r.score_state.as_str()],
            )?;
        }
        for m in &tables.recovery_metrics {
            tx.execute(
                "INSERT OR REPLACE INTO recovery_facts
                 (recovery_id, athlete_id, recovery_score, hrv_rmssd_milli, resting_heart_rate)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    m.recovery_id,
                    m.athlete_id,
                    m.recovery_score,
                    m.hrv_rmssd_milli,
                    m.resting_heart_rate
                ],
            )?;
        }
        for w in &tables.cycle_metrics {
            tx.execute(
                "INSERT OR REPLACE INTO cycle_metrics (cycle_id, athlete_id, strain) VALUES (?1, ?2, ?3)",
                params![w.cycle_id, w.athlete_id, w.strain],
            )?;
        }
        for s in &tables.sleeps {
            tx.execute(
                "INSERT OR REPLACE INTO sleeps (id, athlete_id, start_time, end_time) VALUES (?1, ?2, ?3, ?4)",
                params![s.id, s.athlete_id, canonical_timestamp(&s.start), canonical_timestamp(&s.end)],
            )?;
        }
        for p in &tables.sleep_performance {
            tx.execute(
                "INSERT OR REPLACE INTO sleep_performance
                 (sleep_id, athlete_id, sleep_performance_percentage,
                  sleep_consistency_percentage, sleep_efficiency_percentage)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    p.sleep_id,
                    p.athlete_id,
                    p.sleep_performance_percentage,
                    p.sleep_consistency_percentage,
                    p.sleep_efficiency_percentage
                ],
            )?;
        }
        for s in &tables.sleep_stages {
            tx.execute(
                "INSERT OR REPLACE INTO sleep_stages
                 (sleep_id, athlete_id, total_in_bed_time_milli, total_awake_time_milli,
                  total_slow_wave_sleep_time_milli, total_rem_sleep_time_milli)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    s.sleep_id,
                    s.athlete_id,
                    s.total_in_bed_time_milli,
                    s.total_awake_time_milli,
                    s.total_slow_wave_sleep_time_milli,
                    s.total_rem_sleep_time_milli
                ],
            )?;
        }

        tx.commit()?;

        let rows = tables.row_count();
        info!(team_id, rows, "Loaded raw tables");
        Ok(rows)
    }

    /// Fetch every input table of one team, one reader per table running in parallel.
    ///
    /// Each reader opens its own connection and pages through its table until
    /// a page comes back shorter than `page_size`.
    pub fn fetch_raw_tables<P: AsRef<Path>>(
        db_path: P,
        team_id: TeamId,
        page_size: usize,
    ) -> Result<RawTables> {
        if page_size == 0 {
            return Err(SquadRsError::Validation(
                "page size must be greater than zero".to_string(),
            ));
        }

        let path = db_path.as_ref();
        let fetch = Fetcher { path, team_id, page_size };

        let mut athletes = None;
        let mut cycles = None;
        let mut recoveries = None;
        let mut recovery_metrics = None;
        let mut cycle_metrics = None;
        let mut sleeps = None;
        let mut sleep_performance = None;
        let mut sleep_stages = None;

        rayon::scope(|s| {
            s.spawn(|_| athletes = Some(fetch.athletes()));
            s.spawn(|_| cycles = Some(fetch.cycles()));
            s.spawn(|_| recoveries = Some(fetch.recoveries()));
            s.spawn(|_| recovery_metrics = Some(fetch.recovery_metrics()));
            s.spawn(|_| cycle_metrics = Some(fetch.cycle_metrics()));
            s.spawn(|_| sleeps = Some(fetch.sleeps()));
            s.spawn(|_| sleep_performance = Some(fetch.sleep_performance()));
            s.spawn(|_| sleep_stages = Some(fetch.sleep_stages()));
        });

        let tables = RawTables {
            athletes: joined("athletes", athletes)?,
            cycles: joined("cycles", cycles)?,
            recoveries: joined("recoveries", recoveries)?,
            recovery_metrics: joined("recovery_facts", recovery_metrics)?,
            cycle_metrics: joined("cycle_metrics", cycle_metrics)?,
            sleeps: joined("sleeps", sleeps)?,
            sleep_performance: joined("sleep_performance", sleep_performance)?,
            sleep_stages: joined("sleep_stages", sleep_stages)?,
        };

        info!(team_id, rows = tables.row_count(), "Fetched raw tables");
        Ok(tables)
    }

    /// Replace every computed row of `team_id` in one transaction.
    ///
    /// Any failure rolls the whole replacement back, leaving the previous
    /// outputs in place.
    pub fn replace_outputs(&mut self, team_id: TeamId, outputs: &OutputTables) -> Result<usize> {
        let tx = self.conn.transaction()?;

        let written = match write_outputs(&tx, team_id, outputs) {
            Ok(written) => written,
            Err(e) => {
                warn!(team_id, error = %e, "Output replacement failed, rolling back");
                return Err(DatabaseError::TransactionError {
                    reason: e.to_string(),
                }
                .into());
            }
        };

        tx.commit().map_err(|e| DatabaseError::TransactionError {
            reason: e.to_string(),
        })?;

        info!(team_id, rows = written, "Replaced computed outputs");
        Ok(written)
    }

    /// Number of rows stored for `team_id` in a computed table
    pub fn output_row_count(&self, table: &str, team_id: TeamId) -> Result<usize> {
        if !OUTPUT_TABLES.contains(&table) {
            return Err(SquadRsError::Validation(format!("Unknown output table: {}", table)));
        }

        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE team_id = ?1", table),
            params![team_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Stored downtime counter for `team_id`
    pub fn load_dbrt(&self, team_id: TeamId) -> Result<Option<Dbrt>> {
        let dbrt = self
            .conn
            .query_row(
                "SELECT team_id, downtime_days, total_days FROM dbrt WHERE team_id = ?1",
                params![team_id],
                |row| {
                    Ok(Dbrt {
                        team_id: row.get(0)?,
                        downtime_days: row.get(1)?,
                        total_days: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(dbrt)
    }
}

fn open_existing(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        DatabaseError::ConnectionFailed {
            reason: format!("{}: {}", path.display(), e),
        }
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn joined<T>(table: &str, slot: Option<Result<Vec<T>>>) -> Result<Vec<T>> {
    slot.unwrap_or_else(|| {
        Err(SquadRsError::Internal(format!("Reader for {} did not complete", table)))
    })
}

fn tracked_columns() -> Vec<String> {
    Metric::TRACKED
        .iter()
        .map(|m| m.column().to_string())
        .collect()
}

fn baseline_columns() -> Vec<String> {
    Metric::TRACKED
        .iter()
        .flat_map(|m| {
            BASELINE_SUFFIXES
                .iter()
                .map(move |suffix| format!("{}_{}", m.column(), suffix))
        })
        .collect()
}

fn column_defs(columns: &[String], sql_type: &str) -> String {
    columns
        .iter()
        .map(|c| format!("{} {}", c, sql_type))
        .collect::<Vec<_>>()
        .join(",\n                ")
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn write_outputs(conn: &Connection, team_id: TeamId, outputs: &OutputTables) -> Result<usize> {
    for table in OUTPUT_TABLES {
        let deleted = conn.execute(&format!("DELETE FROM {} WHERE team_id = ?1", table), params![team_id])?;
        debug!(table, deleted, "Cleared previous rows");
    }

    let mut written = 0;
    let tracked = tracked_columns();

    for (table, rows) in [
        ("recovery_metrics", &outputs.recovery_metrics),
        ("workload_metrics", &outputs.workload_metrics),
    ] {
        let mut stmt = conn.prepare(&insert_sql(table, &columns(&["team_id", "athlete_id", "period", "value"])))?;
        for row in rows {
            stmt.execute(params![row.team_id, row.athlete_id, row.period.as_str(), row.value])?;
        }
        written += rows.len();
    }

    for (table, rows) in [
        ("recovery_metrics_average", &outputs.recovery_metrics_average),
        ("workload_metrics_average", &outputs.workload_metrics_average),
    ] {
        let mut stmt = conn.prepare(&insert_sql(table, &columns(&["team_id", "period", "value"])))?;
        for row in rows {
            stmt.execute(params![row.team_id, row.period.as_str(), row.value])?;
        }
        written += rows.len();
    }

    {
        let mut stmt = conn.prepare(&insert_sql(
            "player_line_chart_metrics",
            &columns(&["team_id", "athlete_id", "time_window", "label", "date", "recovery", "workload"]),
        ))?;
        for row in &outputs.player_line_chart_metrics {
            stmt.execute(params![
                row.team_id,
                row.athlete_id,
                row.time_window.as_str(),
                row.label,
                row.date,
                row.recovery,
                row.workload
            ])?;
        }
        written += outputs.player_line_chart_metrics.len();
    }

    {
        let mut stmt = conn.prepare(&insert_sql(
            "homepage_line_chart_metrics",
            &columns(&["team_id", "time_window", "label", "date", "recovery", "workload"]),
        ))?;
        for row in &outputs.homepage_line_chart_metrics {
            stmt.execute(params![
                row.team_id,
                row.time_window.as_str(),
                row.label,
                row.date,
                row.recovery,
                row.workload
            ])?;
        }
        written += outputs.homepage_line_chart_metrics.len();
    }

    {
        let mut cols = columns(&["team_id", "athlete_id", "time_window", "label", "date"]);
        cols.extend(tracked.iter().cloned());
        cols.extend(columns(&["sleep_start", "sleep_end"]));
        let mut stmt = conn.prepare(&insert_sql("performance_line_chart_metrics", &cols))?;
        for row in &outputs.performance_line_chart_metrics {
            let mut values = vec![
                Value::from(row.team_id),
                Value::from(row.athlete_id),
                Value::from(row.time_window.as_str().to_string()),
                Value::from(row.label.clone()),
                Value::from(row.date.clone()),
            ];
            values.extend(Metric::TRACKED.iter().map(|m| Value::from(row.values.get(*m))));
            values.push(Value::from(row.sleep_start.clone()));
            values.push(Value::from(row.sleep_end.clone()));
            stmt.execute(params_from_iter(values.iter()))?;
        }
        written += outputs.performance_line_chart_metrics.len();
    }

    {
        let mut cols = columns(&["team_id", "athlete_id", "date"]);
        cols.extend(tracked.iter().cloned());
        cols.extend(columns(&["sleep_start", "sleep_end"]));
        let mut stmt = conn.prepare(&insert_sql("all_time_metrics", &cols))?;
        for row in &outputs.all_time_metrics {
            let mut values = vec![
                Value::from(row.team_id),
                Value::from(row.athlete_id),
                Value::from(row.date.clone()),
            ];
            values.extend(Metric::TRACKED.iter().map(|m| Value::from(row.values.get(*m))));
            values.push(Value::from(row.sleep_start.clone()));
            values.push(Value::from(row.sleep_end.clone()));
            stmt.execute(params_from_iter(values.iter()))?;
        }
        written += outputs.all_time_metrics.len();
    }

    {
        let mut cols = columns(&["team_id", "athlete_id"]);
        cols.extend(tracked.iter().cloned());
        let mut stmt = conn.prepare(&insert_sql("all_time_metrics_averages", &cols))?;
        for row in &outputs.all_time_metrics_averages {
            let mut values = vec![Value::from(row.team_id), Value::from(row.athlete_id)];
            values.extend(Metric::TRACKED.iter().map(|m| Value::from(row.values.get(*m))));
            stmt.execute(params_from_iter(values.iter()))?;
        }
        written += outputs.all_time_metrics_averages.len();
    }

    {
        let mut stmt = conn.prepare(&insert_sql(
            "recovery_squad_availability",
            &columns(&["team_id", "athlete_id", "period", "value"]),
        ))?;
        for row in &outputs.recovery_squad_availability {
            stmt.execute(params![row.team_id, row.athlete_id, row.period.as_str(), row.value])?;
        }
        written += outputs.recovery_squad_availability.len();
    }

    {
        let mut cols = columns(&["team_id", "athlete_id"]);
        cols.extend(baseline_columns());
        let mut stmt = conn.prepare(&insert_sql("alert_system", &cols))?;
        for row in &outputs.alert_system {
            let mut values = vec![Value::from(row.team_id), Value::from(row.athlete_id)];
            for metric in Metric::TRACKED {
                let stats = row.baselines.get(metric);
                values.extend([
                    Value::from(stats.three_month_mean),
                    Value::from(stats.three_month_std_dev),
                    Value::from(stats.all_time_mean),
                    Value::from(stats.all_time_std_dev),
                ]);
            }
            stmt.execute(params_from_iter(values.iter()))?;
        }
        written += outputs.alert_system.len();
    }

    conn.execute(
        "INSERT INTO dbrt (team_id, downtime_days, total_days) VALUES (?1, ?2, ?3)",
        params![team_id, outputs.dbrt.downtime_days, outputs.dbrt.total_days],
    )?;
    written += 1;

    Ok(written)
}

/// Paginated reader for one team's input tables
#[derive(Clone, Copy)]
struct Fetcher<'p> {
    path: &'p Path,
    team_id: TeamId,
    page_size: usize,
}

impl Fetcher<'_> {
    /// Run `sql` page by page until a short page, mapping each row with `map`.
    ///
    /// `sql` takes the team id as `?1`, the limit as `?2` and the offset as `?3`.
    fn paged<T>(&self, table: &'static str, sql: &str, map: impl Fn(&Row) -> Result<T>) -> Result<Vec<T>> {
        let query_failed = |e: rusqlite::Error| -> SquadRsError {
            DatabaseError::QueryFailed {
                table: table.to_string(),
                reason: e.to_string(),
            }
            .into()
        };

        let conn = open_existing(self.path)?;
        let mut stmt = conn.prepare(sql).map_err(query_failed)?;

        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut rows = stmt
                .query(params![self.team_id, self.page_size as i64, offset as i64])
                .map_err(query_failed)?;

            let mut page = 0usize;
            while let Some(row) = rows.next().map_err(query_failed)? {
                out.push(map(row)?);
                page += 1;
            }

            debug!(table, offset, page, "Fetched page");
            if page < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        Ok(out)
    }

    fn athletes(&self) -> Result<Vec<Athlete>> {
        self.paged(
            "athletes",
            "SELECT id, team_id, name FROM athletes WHERE team_id = ?1
             ORDER BY id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(Athlete {
                    id: row.get(0)?,
                    team_id: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )
    }

    fn cycles(&self) -> Result<Vec<Cycle>> {
        self.paged(
            "cycles",
            "SELECT id, athlete_id, start_time FROM cycles
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(Cycle {
                    id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    start: parse_timestamp("cycles", "start_time", row.get(2)?)?,
                })
            },
        )
    }

    fn recoveries(&self) -> Result<Vec<Recovery>> {
        self.paged(
            "recoveries",
            "SELECT id, athlete_id, cycle_id, sleep_id, score_state FROM recoveries
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, id LIMIT ?2 OFFSET ?3",
            |row| {
                let state: String = row.get(4)?;
                let score_state = state.parse::<ScoreState>().map_err(|_| {
                    DatabaseError::MalformedValue {
                        table: "recoveries".to_string(),
                        column: "score_state".to_string(),
                        value: state.clone(),
                    }
                })?;
                Ok(Recovery {
                    id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    cycle_id: row.get(2)?,
                    sleep_id: row.get(3)?,
                    score_state,
                })
            },
        )
    }

    fn recovery_metrics(&self) -> Result<Vec<RecoveryMetrics>> {
        self.paged(
            "recovery_facts",
            "SELECT recovery_id, athlete_id, recovery_score, hrv_rmssd_milli, resting_heart_rate
             FROM recovery_facts
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, recovery_id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(RecoveryMetrics {
                    recovery_id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    recovery_score: row.get(2)?,
                    hrv_rmssd_milli: row.get(3)?,
                    resting_heart_rate: row.get(4)?,
                })
            },
        )
    }

    fn cycle_metrics(&self) -> Result<Vec<CycleMetrics>> {
        self.paged(
            "cycle_metrics",
            "SELECT cycle_id, athlete_id, strain FROM cycle_metrics
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, cycle_id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(CycleMetrics {
                    cycle_id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    strain: row.get(2)?,
                })
            },
        )
    }

    fn sleeps(&self) -> Result<Vec<Sleep>> {
        self.paged(
            "sleeps",
            "SELECT id, athlete_id, start_time, end_time FROM sleeps
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(Sleep {
                    id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    start: parse_timestamp("sleeps", "start_time", row.get(2)?)?,
                    end: parse_timestamp("sleeps", "end_time", row.get(3)?)?,
                })
            },
        )
    }

    fn sleep_performance(&self) -> Result<Vec<SleepPerformance>> {
        self.paged(
            "sleep_performance",
            "SELECT sleep_id, athlete_id, sleep_performance_percentage,
                    sleep_consistency_percentage, sleep_efficiency_percentage
             FROM sleep_performance
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, sleep_id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(SleepPerformance {
                    sleep_id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    sleep_performance_percentage: row.get(2)?,
                    sleep_consistency_percentage: row.get(3)?,
                    sleep_efficiency_percentage: row.get(4)?,
                })
            },
        )
    }

    fn sleep_stages(&self) -> Result<Vec<SleepStages>> {
        self.paged(
            "sleep_stages",
            "SELECT sleep_id, athlete_id, total_in_bed_time_milli, total_awake_time_milli,
                    total_slow_wave_sleep_time_milli, total_rem_sleep_time_milli
             FROM sleep_stages
             WHERE athlete_id IN (SELECT id FROM athletes WHERE team_id = ?1)
             ORDER BY athlete_id, sleep_id LIMIT ?2 OFFSET ?3",
            |row| {
                Ok(SleepStages {
                    sleep_id: row.get(0)?,
                    athlete_id: row.get(1)?,
                    total_in_bed_time_milli: row.get(2)?,
                    total_awake_time_milli: row.get(3)?,
                    total_slow_wave_sleep_time_milli: row.get(4)?,
                    total_rem_sleep_time_milli: row.get(5)?,
                })
            },
        )
    }
}

fn parse_timestamp(table: &str, column: &str, value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            DatabaseError::MalformedValue {
                table: table.to_string(),
                column: column.to_string(),
                value,
            }
            .into()
        })
}
