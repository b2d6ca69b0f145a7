//! SQLite store for sensor readings
//!
//! One file, one table (`sensor_data`). The collector appends rows; nothing
//! in this crate updates or deletes them.

use eyre::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use std::path::Path;

use crate::reading::{SensorEvent, SensorReading};

pub const TABLE_NAME: &str = "sensor_data";

/// Column order shared by the SELECT and the CSV export
pub const COLUMNS: [&str; 12] = [
    "id",
    "receive_time",
    "temp",
    "hum",
    "press",
    "gas",
    "aq",
    "dist",
    "lat",
    "lon",
    "alt",
    "sd_status",
];

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS sensor_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    receive_time TEXT NOT NULL,
    temp REAL,
    hum REAL,
    press REAL,
    gas REAL,
    aq REAL,
    dist INTEGER,
    lat REAL,
    lon REAL,
    alt REAL,
    sd_status INTEGER
)";

const INSERT_SQL: &str = "
INSERT INTO sensor_data
    (receive_time, temp, hum, press, gas, aq, dist, lat, lon, alt, sd_status)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const SELECT_SQL: &str = "
SELECT id, receive_time, temp, hum, press, gas, aq, dist, lat, lon, alt, sd_status
FROM sensor_data";

/// Handle on the readings database
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database and make sure the table exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context(format!("Failed to open database {}", path.display()))?;
        conn.execute(CREATE_TABLE_SQL, [])
            .context("Failed to create sensor_data table")?;

        log::info!("Database ready: {}", path.display());
        Ok(Self { conn })
    }

    /// Open an existing database without creating or altering anything
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Persist one event, returning the id the store assigned
    pub fn insert(&self, event: &SensorEvent, receive_time: &str) -> rusqlite::Result<i64> {
        self.conn.execute(
            INSERT_SQL,
            params![
                receive_time,
                event.temp,
                event.hum,
                event.press,
                event.gas,
                event.aq,
                event.dist,
                event.lat,
                event.lon,
                event.alt,
                event.sd,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Every stored reading, oldest first
    pub fn readings(&self) -> rusqlite::Result<Vec<SensorReading>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_SQL} ORDER BY id"))?;
        let rows = stmt.query_map([], reading_from_row)?;
        rows.collect()
    }

    /// Most recent reading, if any
    pub fn latest(&self) -> rusqlite::Result<Option<SensorReading>> {
        self.conn
            .query_row(&format!("{SELECT_SQL} ORDER BY id DESC LIMIT 1"), [], reading_from_row)
            .optional()
    }

    pub fn count(&self) -> rusqlite::Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// True when the table exists with at least the expected columns.
    ///
    /// Databases written by older firmware revisions lack `aq` and
    /// `sd_status`; inserts and exports against them fail.
    pub fn schema_matches(&self) -> rusqlite::Result<bool> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let names = stmt
            .query_map([TABLE_NAME], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(COLUMNS.iter().all(|column| names.iter().any(|name| name == column)))
    }
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<SensorReading> {
    let defaults = SensorEvent::default();

    // Rows inserted by other tools may carry NULLs; show them as sentinels
    Ok(SensorReading {
        id: row.get(0)?,
        receive_time: row.get(1)?,
        event: SensorEvent {
            temp: row.get::<_, Option<f64>>(2)?.unwrap_or(defaults.temp),
            hum: row.get::<_, Option<f64>>(3)?.unwrap_or(defaults.hum),
            press: row.get::<_, Option<f64>>(4)?.unwrap_or(defaults.press),
            gas: row.get::<_, Option<f64>>(5)?.unwrap_or(defaults.gas),
            aq: row.get::<_, Option<f64>>(6)?.unwrap_or(defaults.aq),
            dist: row.get::<_, Option<i64>>(7)?.unwrap_or(defaults.dist),
            lat: row.get::<_, Option<f64>>(8)?.unwrap_or(defaults.lat),
            lon: row.get::<_, Option<f64>>(9)?.unwrap_or(defaults.lon),
            alt: row.get::<_, Option<f64>>(10)?.unwrap_or(defaults.alt),
            sd: row.get::<_, Option<i64>>(11)?.unwrap_or(defaults.sd),
        },
    })
}
