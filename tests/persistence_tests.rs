//! Batch runs against a real SQLite file: pagination, replacement and rollback

mod common;

use common::{date, squad_fixture};
use squadrs::database::{Database, OUTPUT_TABLES};
use squadrs::error::{CalculationError, DatabaseError, SquadRsError};
use squadrs::pipeline::{compute, run_batch, BatchRequest};
use tempfile::TempDir;

const TEAM: i64 = 7;

fn seeded_database(dir: &TempDir, athletes: i64, days: i64) -> std::path::PathBuf {
    let path = dir.path().join("squad.db");
    let mut db = Database::new(&path).unwrap();
    db.load_raw_tables(TEAM, &squad_fixture(TEAM, athletes, days, date(2025, 4, 30)))
        .unwrap();
    path
}

fn request(path: &std::path::Path) -> BatchRequest {
    let mut request = BatchRequest::new(TEAM, path);
    request.as_of = date(2025, 4, 30);
    request
}

#[test]
fn test_batch_persists_every_table() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 3, 60);

    let response = run_batch(&request(&path)).unwrap();
    assert!(response.persisted);

    let db = Database::open(&path).unwrap();
    for (table, rows) in response.payload.tables.row_counts() {
        assert_eq!(db.output_row_count(table, TEAM).unwrap(), rows, "{}", table);
    }
    let dbrt = db.load_dbrt(TEAM).unwrap().unwrap();
    assert_eq!(dbrt, response.payload.tables.dbrt);
}

#[test]
fn test_pagination_reads_beyond_one_page() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 4, 45);

    // 180 cycles per table, far more than one page of 16
    let paged = Database::fetch_raw_tables(&path, TEAM, 16).unwrap();
    let whole = Database::fetch_raw_tables(&path, TEAM, 10_000).unwrap();
    assert_eq!(paged.cycles.len(), 4 * 45);
    assert_eq!(paged, whole);

    // exact multiple of the page size still terminates on the empty page
    let exact = Database::fetch_raw_tables(&path, TEAM, 45).unwrap();
    assert_eq!(exact.cycles.len(), 4 * 45);
}

#[test]
fn test_repeated_batches_replace_instead_of_append() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 2, 40);

    let first = run_batch(&request(&path)).unwrap();
    let second = run_batch(&request(&path)).unwrap();

    assert_ne!(first.payload.run_id, second.payload.run_id);
    assert_eq!(
        serde_json::to_string(&first.payload.tables).unwrap(),
        serde_json::to_string(&second.payload.tables).unwrap()
    );

    let db = Database::open(&path).unwrap();
    assert_eq!(
        db.output_row_count("recovery_metrics", TEAM).unwrap(),
        second.payload.tables.recovery_metrics.len()
    );
}

#[test]
fn test_batch_matches_in_memory_compute() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 2, 30);

    let mut dry_run = request(&path);
    dry_run.persist = false;
    dry_run.page_size = 7;
    let response = run_batch(&dry_run).unwrap();
    assert!(!response.persisted);

    let raw = squad_fixture(TEAM, 2, 30, date(2025, 4, 30));
    let expected = compute(TEAM, &raw, date(2025, 4, 30));
    assert_eq!(response.payload.tables, expected.tables);

    let db = Database::open(&path).unwrap();
    for table in OUTPUT_TABLES {
        assert_eq!(db.output_row_count(table, TEAM).unwrap(), 0);
    }
}

#[test]
fn test_failed_write_keeps_previous_outputs() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 2, 20);
    let before = run_batch(&request(&path)).unwrap();

    Database::open(&path)
        .unwrap()
        .connection()
        .execute_batch("DROP TABLE alert_system")
        .unwrap();

    let err = run_batch(&request(&path)).unwrap_err();
    assert!(matches!(
        err,
        SquadRsError::Database(DatabaseError::TransactionError { .. })
    ));

    let db = Database::open(&path).unwrap();
    assert_eq!(
        db.output_row_count("recovery_metrics", TEAM).unwrap(),
        before.payload.tables.recovery_metrics.len()
    );
    assert_eq!(db.load_dbrt(TEAM).unwrap(), Some(before.payload.tables.dbrt));
}

#[test]
fn test_pre_flight_failure_aborts_batch() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 1, 5);
    Database::open(&path)
        .unwrap()
        .connection()
        .execute_batch("DROP TABLE dbrt")
        .unwrap();

    let err = run_batch(&request(&path)).unwrap_err();
    assert_eq!(err.kind(), "connection_error");
    assert!(err.to_error_body().message.contains("Unable to connect"));
}

#[test]
fn test_missing_database_is_a_connection_error() {
    let dir = TempDir::new().unwrap();
    let err = run_batch(&request(&dir.path().join("nowhere.db"))).unwrap_err();

    assert_eq!(err.kind(), "connection_error");
}

#[test]
fn test_unknown_team_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 1, 5);

    let mut other_team = request(&path);
    other_team.team_id = 99;
    let err = run_batch(&other_team).unwrap_err();

    assert!(matches!(
        err,
        SquadRsError::Calculation(CalculationError::EmptyRoster { team_id: 99 })
    ));
}

#[test]
fn test_teams_do_not_overwrite_each_other() {
    let dir = TempDir::new().unwrap();
    let path = seeded_database(&dir, 2, 10);
    let mut db = Database::open(&path).unwrap();
    db.load_raw_tables(8, &squad_fixture(8, 1, 10, date(2025, 4, 30)))
        .unwrap();

    let team_7 = run_batch(&request(&path)).unwrap();
    let mut other = request(&path);
    other.team_id = 8;
    run_batch(&other).unwrap();

    assert_eq!(
        db.output_row_count("alert_system", TEAM).unwrap(),
        team_7.payload.tables.alert_system.len()
    );
    assert_eq!(db.output_row_count("alert_system", 8).unwrap(), 1);
}
