//! Data tooling: validate a directory store and import records from JSON.
//!
//! The import file is a JSON array of records in the same camelCase shape the
//! store serializes (`canonicalName`, `officeLocation`, `extension`,
//! `presenceDays`, `courses[{title, code, room}]`). Re-importing a name
//! replaces that record and its course list.

use std::path::Path;

use deskline_store::schema::REQUIRED_TABLES;
use deskline_store::{DirectoryStore, Record};
use rusqlite::Connection;
use tracing::{error, info, warn};

/// Result of a validate or import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub db_valid: bool,
    pub records: i64,
    pub courses: i64,
    pub imported: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

const RECORD_COLUMNS: &[&str] = &[
    "id",
    "canonical_name",
    "name_key",
    "office_location",
    "extension",
    "presence_days",
];

const COURSE_COLUMNS: &[&str] = &["record_id", "position", "title", "code", "room"];

/// Check that `data_dir` holds a usable directory store.
pub fn validate(data_dir: &Path) -> ImportReport {
    let mut report = ImportReport::default();

    let db_path = data_dir.join("db").join("deskline.db");
    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
        return report;
    }

    let conn = match Connection::open_with_flags(
        &db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    ) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    for table in REQUIRED_TABLES {
        match table_exists(&conn, table) {
            Ok(true) => {}
            Ok(false) => report.errors.push(format!("Missing required table: {}", table)),
            Err(e) => report
                .errors
                .push(format!("Error checking table {}: {}", table, e)),
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    for (table, required) in [("records", RECORD_COLUMNS), ("courses", COURSE_COLUMNS)] {
        let columns = get_column_names(&conn, table);
        for col in required {
            if !columns.iter().any(|c| c == col) {
                report
                    .errors
                    .push(format!("{} table missing column: {}", table, col));
            }
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    report.db_valid = true;
    report.records = count_rows(&conn, "records").unwrap_or(0);
    report.courses = count_rows(&conn, "courses").unwrap_or(0);

    if report.records == 0 {
        report
            .warnings
            .push("Store is empty; every query will end as not found".into());
    }
    report
}

/// Load a JSON array of records from `source` into the store under `data_dir`.
pub fn import_records(source: &Path, data_dir: &Path) -> ImportReport {
    let mut report = ImportReport::default();

    let records: Vec<Record> = match std::fs::read_to_string(source)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
    {
        Ok(r) => r,
        Err(e) => {
            report
                .errors
                .push(format!("Cannot read {}: {}", source.display(), e));
            return report;
        }
    };

    let store = match DirectoryStore::open(data_dir.join("db")) {
        Ok(s) => s,
        Err(e) => {
            report.errors.push(format!("Failed to open store: {}", e));
            return report;
        }
    };

    for (i, record) in records.iter().enumerate() {
        if record.canonical_name.trim().is_empty() {
            report
                .warnings
                .push(format!("Entry {} has no canonicalName; skipped", i));
            report.skipped += 1;
            continue;
        }
        match store.upsert_record(record) {
            Ok(_) => report.imported += 1,
            Err(e) => {
                error!("Import of {:?} failed: {}", record.canonical_name, e);
                report
                    .errors
                    .push(format!("{}: {}", record.canonical_name, e));
            }
        }
    }
    if report.skipped > 0 {
        warn!("Skipped {} unnamed entries", report.skipped);
    }

    match store.get_stats() {
        Ok(stats) => {
            report.db_valid = true;
            report.records = stats.total_records;
            report.courses = stats.total_courses;
        }
        Err(e) => report.errors.push(format!("Failed to read stats: {}", e)),
    }

    info!(
        "Imported {} of {} records from {}",
        report.imported,
        records.len(),
        source.display()
    );
    report
}

/// Print a report to stdout.
pub fn print_report(report: &ImportReport) {
    println!("=== Deskline Store Report ===");
    println!();
    println!("Database valid:     {}", if report.db_valid { "YES" } else { "NO" });
    println!("Records:            {}", report.records);
    println!("Courses:            {}", report.courses);
    if report.imported > 0 || report.skipped > 0 {
        println!("Imported:           {}", report.imported);
        println!("Skipped:            {}", report.skipped);
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.errors.is_empty() && report.db_valid {
        println!("Status: READY");
    } else {
        println!("Status: FAILED");
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_column_names(conn: &Connection, table: &str) -> Vec<String> {
    // Table names come from the fixed lists above.
    let query = format!("PRAGMA table_info({})", table);
    let mut names = Vec::new();
    if let Ok(mut stmt) = conn.prepare(&query) {
        if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) {
            names.extend(rows.flatten());
        }
    }
    names
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&query, [], |row| row.get(0))
}
