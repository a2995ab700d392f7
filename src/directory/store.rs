//! SQLite-backed sensor directory.
//!
//! Holds the durable location → sensor mapping. The reconciliation invariants
//! (no duplicate registration, no duplicate notification) are enforced here
//! with atomic conditional statements rather than application-level locks:
//! the connection is serialized behind a mutex, so each primitive below is
//! linearizable.

use super::{SensorRecord, SensorStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

const SELECT_COLUMNS: &str = "id, location, status, sensor_type, ip, updated_at";

/// Durable mapping from location key to sensor record.
///
/// # Schema
/// ```sql
/// CREATE TABLE sensors (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     location TEXT NOT NULL UNIQUE,
///     status INTEGER,            -- NULL = never reported, 0 = empty, 1 = occupied
///     sensor_type TEXT NOT NULL,
///     ip TEXT,
///     created_at TEXT NOT NULL,  -- ISO 8601
///     updated_at TEXT NOT NULL   -- ISO 8601, last accepted state change
/// );
/// ```
///
/// `AUTOINCREMENT` keeps ids monotonic: a sensor re-registering after a
/// reset never inherits the id of a deleted record.
pub struct SensorDirectory {
    conn: Mutex<Connection>,
}

impl SensorDirectory {
    /// Creates or opens the directory database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open sensor database")?;
        Self::init(conn)
    }

    /// In-memory directory, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sensors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT NOT NULL UNIQUE,
                status INTEGER,
                sensor_type TEXT NOT NULL,
                ip TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create sensors table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Looks up the record for a location key.
    pub fn find_by_location(&self, location: &str) -> Result<Option<SensorRecord>> {
        let conn = self.conn.lock().unwrap();
        find_by_location(&conn, location)
    }

    /// Number of records registered at a location (0 or 1 given the unique
    /// constraint).
    pub fn count_by_location(&self, location: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM sensors WHERE location = ?1",
            params![location],
            |row| row.get(0),
        )
        .context("Failed to count sensors by location")
    }

    /// Looks up a record by its directory-assigned id.
    pub fn find_by_id(&self, id: i64) -> Result<Option<SensorRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sensors WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()
        .context("Failed to query sensor by id")
    }

    /// Creates a record unconditionally. Fails on a duplicate location.
    pub fn create(&self, location: &str, sensor_type: &str) -> Result<SensorRecord> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO sensors (location, status, sensor_type, ip, created_at, updated_at)
             VALUES (?1, NULL, ?2, NULL, ?3, ?3)",
            params![location, sensor_type, now],
        )
        .context("Failed to insert sensor")?;

        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sensors WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .context("Failed to read back created sensor")
    }

    /// Atomic conditional create: inserts a fresh `Unknown` record unless the
    /// location is already registered. Returns true iff a record was created.
    ///
    /// This is the insert-if-absent primitive that makes auto-registration
    /// race-free without a count-then-create sequence.
    pub fn create_if_absent(&self, location: &str, sensor_type: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let inserted = conn
            .execute(
                "INSERT INTO sensors (location, status, sensor_type, ip, created_at, updated_at)
                 VALUES (?1, NULL, ?2, NULL, ?3, ?3)
                 ON CONFLICT(location) DO NOTHING",
                params![location, sensor_type, now],
            )
            .context("Failed to conditionally insert sensor")?;
        Ok(inserted == 1)
    }

    /// Atomic compare-and-update of the occupancy status.
    ///
    /// Persists the new status and `updated_at` only when the stored status
    /// actually differs, and returns the fresh record in that case. Returns
    /// `None` when the location is unknown or the status is unchanged, with
    /// no write in either case.
    pub fn set_status_if_changed(
        &self,
        location: &str,
        occupied: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<SensorRecord>> {
        let status = occupied as i64;
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE sensors SET status = ?1, updated_at = ?2
                 WHERE location = ?3 AND (status IS NULL OR status != ?1)",
                params![status, now.to_rfc3339(), location],
            )
            .context("Failed to update sensor status")?;

        if changed == 0 {
            return Ok(None);
        }
        find_by_location(&conn, location)
    }

    /// Unconditionally overwrites the last-known address for a location.
    /// A no-op for unregistered locations; never touches `updated_at`.
    pub fn update_ip(&self, location: &str, address: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sensors SET ip = ?1 WHERE location = ?2",
            params![address, location],
        )
        .context("Failed to update sensor address")?;
        Ok(())
    }

    /// Deletes a record, freeing its location key for re-registration.
    /// Returns true iff a record existed.
    pub fn delete_by_id(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM sensors WHERE id = ?1", params![id])
            .context("Failed to delete sensor")?;
        Ok(deleted > 0)
    }

    /// All sensors that have reported at least once, ordered by location
    /// ascending (the dashboard listing).
    pub fn list_reported(&self) -> Result<Vec<SensorRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM sensors
                 WHERE status IS NOT NULL ORDER BY location ASC"
            ))
            .context("Failed to prepare sensor listing")?;
        let rows = stmt
            .query_map([], row_to_record)
            .context("Failed to list sensors")?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read sensor row")?);
        }
        Ok(records)
    }
}

fn find_by_location(conn: &Connection, location: &str) -> Result<Option<SensorRecord>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM sensors WHERE location = ?1"),
        params![location],
        row_to_record,
    )
    .optional()
    .context("Failed to query sensor by location")
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SensorRecord> {
    let status: Option<i64> = row.get(2)?;
    let updated_at: String = row.get(5)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(SensorRecord {
        id: row.get(0)?,
        location: row.get(1)?,
        status: SensorStatus::from_column(status),
        sensor_type: row.get(3)?,
        ip: row.get(4)?,
        updated_at,
    })
}
