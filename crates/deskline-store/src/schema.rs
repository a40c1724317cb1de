//! Database schema SQL for the directory store.

/// Core tables: records and their ordered course lists.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_name TEXT NOT NULL UNIQUE,
    name_key TEXT NOT NULL,
    office_location TEXT NOT NULL DEFAULT '',
    extension TEXT NOT NULL DEFAULT '',
    presence_days TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_name_key ON records(name_key);

CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    code TEXT,
    room TEXT
);

CREATE INDEX IF NOT EXISTS idx_courses_record ON courses(record_id);
"#;

/// Tables the `validate` command requires.
pub const REQUIRED_TABLES: &[&str] = &["records", "courses"];
