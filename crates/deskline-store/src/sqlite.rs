//! SQLite-backed directory store.
//!
//! Records are matched on a normalized `name_key` column so lookups stay
//! case-insensitive for non-ASCII names too (SQLite's `lower()` is ASCII-only).

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use deskline_core::{Error, Result};

/// SQLite store holding directory records and their course lists.
pub struct DirectoryStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DirectoryStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/deskline.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("deskline.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "DirectoryStore initialized: {} records, path={}",
            store.count_records()?,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Insert or replace a record and its whole course list.
    pub fn upsert_record(&self, record: &Record) -> Result<i64> {
        let name = record.canonical_name.trim();
        if name.is_empty() {
            return Err(Error::Storage("record has an empty canonical name".into()));
        }
        let now = chrono::Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO records (canonical_name, name_key, office_location, extension, presence_days, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(canonical_name) DO UPDATE SET \
               name_key = excluded.name_key, \
               office_location = excluded.office_location, \
               extension = excluded.extension, \
               presence_days = excluded.presence_days, \
               updated_at = excluded.updated_at",
            params![
                name,
                name_key(name),
                record.office_location,
                record.extension,
                record.presence_days,
                now,
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        let id: i64 = tx
            .query_row(
                "SELECT id FROM records WHERE canonical_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.execute("DELETE FROM courses WHERE record_id = ?1", params![id])
            .map_err(|e| Error::Database(e.to_string()))?;
        for (position, course) in record.courses.iter().enumerate() {
            tx.execute(
                "INSERT INTO courses (record_id, position, title, code, room) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, position as i64, course.title, course.code, course.room],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        debug!("Upserted record {} ({} courses)", name, record.courses.len());
        Ok(id)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// First record (by id) whose key contains, or is contained in, the query key.
    pub fn find_by_approximate_name(&self, name: &str) -> Result<Option<Record>> {
        let key = name_key(name);
        if key.is_empty() {
            return Ok(None);
        }

        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(
                "SELECT id, canonical_name, office_location, extension, presence_days FROM records \
                 WHERE instr(name_key, ?1) > 0 OR instr(?1, name_key) > 0 \
                 ORDER BY id LIMIT 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![key], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Record {
                        canonical_name: row.get(1)?,
                        office_location: row.get(2)?,
                        extension: row.get(3)?,
                        presence_days: row.get(4)?,
                        courses: Vec::new(),
                    },
                ))
            })
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        match row {
            Some((id, mut record)) => {
                record.courses = Self::courses_for(&conn, id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn courses_for(conn: &Connection, record_id: i64) -> Result<Vec<Course>> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT title, code, room FROM courses WHERE record_id = ?1 ORDER BY position",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![record_id], |row| {
                Ok(Course {
                    title: row.get(0)?,
                    code: row.get(1)?,
                    room: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        let courses = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(courses)
    }

    /// All canonical names, in insertion order.
    pub fn list_all_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT canonical_name FROM records ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        let names: Vec<String> = rows.filter_map(|r| r.ok()).collect();
        Ok(names)
    }

    /// Count total records.
    pub fn count_records(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let total_records = self.count_records()?;
        let total_courses: i64 = {
            let conn = self.conn.lock();
            conn.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))
                .map_err(|e| Error::Database(e.to_string()))?
        };
        let db_size_mb = std::fs::metadata(&self.db_path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        Ok(StoreStats {
            total_records,
            total_courses,
            db_path: self.db_path.display().to_string(),
            db_size_mb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (DirectoryStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn sample_record(name: &str) -> Record {
        Record {
            canonical_name: name.into(),
            office_location: "Engineering Building 5F, Room 512".into(),
            extension: "3141".into(),
            presence_days: Some("Mon, Wed".into()),
            courses: vec![
                Course {
                    title: "Data Structures".into(),
                    code: Some("CS201-A".into()),
                    room: Some("E301".into()),
                },
                Course {
                    title: "Data Structures".into(),
                    code: Some("CS201-B".into()),
                    room: Some("E302".into()),
                },
            ],
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Yin Bang-yen")).unwrap();

        let found = store.find_by_approximate_name("yin bang-yen").unwrap().unwrap();
        assert_eq!(found.canonical_name, "Yin Bang-yen");
        assert_eq!(found.courses.len(), 2);
        assert_eq!(found.courses[1].code.as_deref(), Some("CS201-B"));
    }

    #[test]
    fn test_find_tolerates_truncation_and_extra_tokens() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Yin Bang-yen")).unwrap();

        assert!(store.find_by_approximate_name("Bang-yen").unwrap().is_some());
        assert!(store
            .find_by_approximate_name("Dr. Yin Bang-yen please")
            .unwrap()
            .is_some());
        assert!(store.find_by_approximate_name("Yin Bang-ching").unwrap().is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Chen Mei")).unwrap();
        store.upsert_record(&sample_record("Chen Meiling")).unwrap();

        let found = store.find_by_approximate_name("chen mei").unwrap().unwrap();
        assert_eq!(found.canonical_name, "Chen Mei");
    }

    #[test]
    fn test_empty_name_is_miss() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Lin Hao")).unwrap();
        assert!(store.find_by_approximate_name("   ").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_courses() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Lin Hao")).unwrap();

        let mut updated = sample_record("Lin Hao");
        updated.courses.truncate(1);
        updated.extension = "2718".into();
        store.upsert_record(&updated).unwrap();

        let found = store.find_by_approximate_name("Lin Hao").unwrap().unwrap();
        assert_eq!(found.courses.len(), 1);
        assert_eq!(found.extension, "2718");
        assert_eq!(store.count_records().unwrap(), 1);
    }

    #[test]
    fn test_list_all_names_in_order() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Lin Hao")).unwrap();
        store.upsert_record(&sample_record("Yin Bang-yen")).unwrap();

        assert_eq!(
            store.list_all_names().unwrap(),
            vec!["Lin Hao".to_string(), "Yin Bang-yen".to_string()]
        );
    }

    #[test]
    fn test_empty_canonical_name_rejected() {
        let (store, _dir) = test_store();
        assert!(store.upsert_record(&sample_record("  ")).is_err());
    }

    #[test]
    fn test_stats() {
        let (store, _dir) = test_store();
        store.upsert_record(&sample_record("Lin Hao")).unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.total_courses, 2);
        assert!(stats.db_path.ends_with("deskline.db"));
    }
}
