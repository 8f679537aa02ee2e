use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::{RecordStatus, WorkoutRecord, WorkoutType};
use crate::timer::{TimerSnapshot, TimerStateStore};

/// Persistence boundary for workout records
pub trait RecordStore {
    /// Add a newly created record
    fn insert(&mut self, record: &WorkoutRecord) -> Result<(), StorageError>;

    /// Write the current state of a record, creating it if needed
    fn save(&mut self, record: &WorkoutRecord) -> Result<(), StorageError>;

    fn delete(&mut self, id: Uuid) -> Result<(), StorageError>;

    fn get(&self, id: Uuid) -> Result<Option<WorkoutRecord>, StorageError>;

    /// All records, newest first
    fn list(&self) -> Result<Vec<WorkoutRecord>, StorageError>;

    /// Most recent completed record of a type
    fn latest_completed(
        &self,
        workout_type: WorkoutType,
    ) -> Result<Option<WorkoutRecord>, StorageError>;
}

impl<T: RecordStore + ?Sized> RecordStore for &mut T {
    fn insert(&mut self, record: &WorkoutRecord) -> Result<(), StorageError> {
        (**self).insert(record)
    }

    fn save(&mut self, record: &WorkoutRecord) -> Result<(), StorageError> {
        (**self).save(record)
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StorageError> {
        (**self).delete(id)
    }

    fn get(&self, id: Uuid) -> Result<Option<WorkoutRecord>, StorageError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<WorkoutRecord>, StorageError> {
        (**self).list()
    }

    fn latest_completed(
        &self,
        workout_type: WorkoutType,
    ) -> Result<Option<WorkoutRecord>, StorageError> {
        (**self).latest_completed(workout_type)
    }
}

impl<T: TimerStateStore + ?Sized> TimerStateStore for &mut T {
    fn save_timer(&mut self, key: &str, snapshot: &TimerSnapshot) -> Result<(), StorageError> {
        (**self).save_timer(key, snapshot)
    }

    fn load_timer(&self, key: &str) -> Result<Option<TimerSnapshot>, StorageError> {
        (**self).load_timer(key)
    }

    fn clear_timer(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).clear_timer(key)
    }
}

/// SQLite-backed record store
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Private database for tests and previews
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&mut self) -> Result<(), StorageError> {
        let journal_mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(journal_mode = %journal_mode, "Record store opened");

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS workouts (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                workout_type TEXT NOT NULL,
                sets TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_workouts_type_date ON workouts (workout_type, date)",
            [],
        )?;

        // Rest timer end times that must survive suspension
        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS timer_state (
                key TEXT PRIMARY KEY,
                end_time TEXT NOT NULL,
                total_seconds INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }

    /// Number of stored workouts
    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM workouts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn record_from_row(row: &Row) -> rusqlite::Result<WorkoutRecord> {
        let id: String = row.get("id")?;
        let id = Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?;

        let date: String = row.get("date")?;
        let date = parse_timestamp(&date).map_err(|e| conversion_error(1, e))?;

        let workout_type: String = row.get("workout_type")?;
        let workout_type = workout_type
            .parse::<WorkoutType>()
            .map_err(|e| conversion_error(2, e))?;

        let sets: String = row.get("sets")?;
        let sets: Vec<u32> = serde_json::from_str(&sets).map_err(|e| conversion_error(3, e))?;

        let status: String = row.get("status")?;
        let status = parse_status(&status).map_err(|e| conversion_error(4, e))?;

        Ok(WorkoutRecord::from_parts(id, date, workout_type, sets, status))
    }

    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<WorkoutRecord>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl RecordStore for SqliteRecordStore {
    fn insert(&mut self, record: &WorkoutRecord) -> Result<(), StorageError> {
        let sets = encode_sets(record.sets())?;
        self.conn.execute(
            r#"
            INSERT INTO workouts (id, date, workout_type, sets, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.id().to_string(),
                format_timestamp(record.date()),
                record.workout_type().as_str(),
                sets,
                status_str(record.status()),
            ],
        )?;
        debug!(record_id = %record.id(), "Inserted workout");
        Ok(())
    }

    fn save(&mut self, record: &WorkoutRecord) -> Result<(), StorageError> {
        let sets = encode_sets(record.sets())?;
        self.conn.execute(
            r#"
            INSERT INTO workouts (id, date, workout_type, sets, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                sets = excluded.sets,
                status = excluded.status,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                record.id().to_string(),
                format_timestamp(record.date()),
                record.workout_type().as_str(),
                sets,
                status_str(record.status()),
            ],
        )?;
        Ok(())
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StorageError> {
        let removed = self
            .conn
            .execute("DELETE FROM workouts WHERE id = ?1", params![id.to_string()])?;
        if removed == 0 {
            return Err(StorageError::NotFound { id });
        }
        debug!(record_id = %id, "Deleted workout");
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<WorkoutRecord>, StorageError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, date, workout_type, sets, status FROM workouts WHERE id = ?1",
                params![id.to_string()],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<WorkoutRecord>, StorageError> {
        self.query_records(
            "SELECT id, date, workout_type, sets, status FROM workouts ORDER BY date DESC",
            &[],
        )
    }

    fn latest_completed(
        &self,
        workout_type: WorkoutType,
    ) -> Result<Option<WorkoutRecord>, StorageError> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT id, date, workout_type, sets, status FROM workouts
                WHERE workout_type = ?1 AND status = ?2
                ORDER BY date DESC
                LIMIT 1
                "#,
                params![workout_type.as_str(), status_str(RecordStatus::Completed)],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }
}

impl TimerStateStore for SqliteRecordStore {
    fn save_timer(&mut self, key: &str, snapshot: &TimerSnapshot) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO timer_state (key, end_time, total_seconds) VALUES (?1, ?2, ?3)",
            params![key, format_timestamp(snapshot.end_time), snapshot.total_seconds],
        )?;
        Ok(())
    }

    fn load_timer(&self, key: &str) -> Result<Option<TimerSnapshot>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT end_time, total_seconds FROM timer_state WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;

        row.map(|(end_time, total_seconds)| {
            Ok(TimerSnapshot {
                end_time: parse_timestamp(&end_time)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                total_seconds,
            })
        })
        .transpose()
    }

    fn clear_timer(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM timer_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: HashMap<Uuid, WorkoutRecord>,
    timers: HashMap<String, TimerSnapshot>,
    fail_writes: bool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise storage error paths
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed {
                reason: "store is not accepting writes".to_string(),
            });
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&mut self, record: &WorkoutRecord) -> Result<(), StorageError> {
        self.check_writable()?;
        if self.records.contains_key(&record.id()) {
            return Err(StorageError::WriteFailed {
                reason: format!("record {} already exists", record.id()),
            });
        }
        self.records.insert(record.id(), record.clone());
        Ok(())
    }

    fn save(&mut self, record: &WorkoutRecord) -> Result<(), StorageError> {
        self.check_writable()?;
        self.records.insert(record.id(), record.clone());
        Ok(())
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StorageError> {
        self.check_writable()?;
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound { id })
    }

    fn get(&self, id: Uuid) -> Result<Option<WorkoutRecord>, StorageError> {
        Ok(self.records.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<WorkoutRecord>, StorageError> {
        let mut records: Vec<WorkoutRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| b.date().cmp(&a.date()));
        Ok(records)
    }

    fn latest_completed(
        &self,
        workout_type: WorkoutType,
    ) -> Result<Option<WorkoutRecord>, StorageError> {
        Ok(self
            .records
            .values()
            .filter(|r| r.workout_type() == workout_type && r.is_completed())
            .max_by_key(|r| r.date())
            .cloned())
    }
}

impl TimerStateStore for MemoryRecordStore {
    fn save_timer(&mut self, key: &str, snapshot: &TimerSnapshot) -> Result<(), StorageError> {
        self.check_writable()?;
        self.timers.insert(key.to_string(), *snapshot);
        Ok(())
    }

    fn load_timer(&self, key: &str) -> Result<Option<TimerSnapshot>, StorageError> {
        Ok(self.timers.get(key).copied())
    }

    fn clear_timer(&mut self, key: &str) -> Result<(), StorageError> {
        self.timers.remove(key);
        Ok(())
    }
}

/// Fixed-width RFC 3339 so text order matches time order
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

fn encode_sets(sets: &[u32]) -> Result<String, StorageError> {
    serde_json::to_string(sets).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn status_str(status: RecordStatus) -> &'static str {
    match status {
        RecordStatus::InProgress => "in_progress",
        RecordStatus::Completed => "completed",
    }
}

fn parse_status(value: &str) -> Result<RecordStatus, String> {
    match value {
        "in_progress" => Ok(RecordStatus::InProgress),
        "completed" => Ok(RecordStatus::Completed),
        other => Err(format!("Unknown record status: {}", other)),
    }
}

fn conversion_error<E>(column: usize, error: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, error.into())
}
