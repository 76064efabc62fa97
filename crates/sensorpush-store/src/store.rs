//! Main store implementation.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use sensorpush_types::DeviceNumber;

use crate::error::{Error, Result};
use crate::models::{CsvRow, NamedDevice, NamedSample, StoredSample};
use crate::queries::SampleQuery;
use crate::schema;

/// SQLite-based store for SensorPush devices, names and samples.
///
/// Every mutating operation runs in its own transaction, so a failed call
/// leaves no partial rows behind.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Database(e))?;
        debug!("Database closed");
        Ok(())
    }
}

// Device operations
impl Store {
    /// Register a device after its identity has been read.
    ///
    /// Returns the new row ID. Fails with [`Error::Conflict`] if either the
    /// device number or the radio address is already registered.
    pub fn add_device(&self, device_number: DeviceNumber, radio_address: &str) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            "INSERT INTO devices (device_number, radio_address) VALUES (?1, ?2)",
            params![device_number.get(), radio_address],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::Conflict {
                    device_number,
                    radio_address: radio_address.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(%device_number, radio_address, "Registered device");
        Ok(id)
    }

    /// Whether a device advertising from `radio_address` is registered.
    pub fn device_known(&self, radio_address: &str) -> Result<bool> {
        Ok(self.resolve_number(radio_address)?.is_some())
    }

    /// Look up the device number registered for `radio_address`.
    pub fn resolve_number(&self, radio_address: &str) -> Result<Option<DeviceNumber>> {
        let number = self
            .conn
            .query_row(
                "SELECT device_number FROM devices WHERE radio_address = ?",
                [radio_address],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;

        Ok(number.map(DeviceNumber::new))
    }

    /// Get a device and its friendly name by device number.
    pub fn device_by_number(&self, device_number: DeviceNumber) -> Result<Option<NamedDevice>> {
        let device = self
            .conn
            .query_row(
                "SELECT d.device_number, d.radio_address, COALESCE(dn.name, '')
                 FROM devices d
                 LEFT JOIN device_names dn ON dn.device_number = d.device_number
                 WHERE d.device_number = ?",
                [device_number.get()],
                named_device_from_row,
            )
            .optional()?;

        Ok(device)
    }

    /// List all devices with their friendly names, by ascending device number.
    pub fn list_devices_with_names(&self) -> Result<Vec<NamedDevice>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.device_number, d.radio_address, COALESCE(dn.name, '')
             FROM devices d
             LEFT JOIN device_names dn ON dn.device_number = d.device_number
             ORDER BY d.device_number ASC",
        )?;

        let devices = stmt
            .query_map([], named_device_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(devices)
    }

    /// Friendly name of a device; empty when never renamed or unknown.
    pub fn friendly_name(&self, device_number: DeviceNumber) -> Result<String> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM device_names WHERE device_number = ?",
                [device_number.get()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(name.unwrap_or_default())
    }

    /// Set or replace the friendly name of a device.
    ///
    /// Fails with [`Error::UnknownDevice`] if the device is not registered.
    pub fn rename_device(&self, device_number: DeviceNumber, name: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        if !device_exists(&tx, device_number)? {
            return Err(Error::UnknownDevice(device_number));
        }

        tx.execute(
            "INSERT INTO device_names (device_number, name) VALUES (?1, ?2)
             ON CONFLICT(device_number) DO UPDATE SET name = excluded.name",
            params![device_number.get(), name],
        )?;
        tx.commit()?;

        debug!(%device_number, name, "Renamed device");
        Ok(())
    }
}

// Sample operations
impl Store {
    /// Record a sample stamped with the current time.
    pub fn add_sample(
        &self,
        device_number: DeviceNumber,
        temperature_c: f64,
        humidity_percent: f64,
    ) -> Result<i64> {
        self.add_sample_at(
            device_number,
            temperature_c,
            humidity_percent,
            OffsetDateTime::now_utc(),
        )
    }

    /// Record a sample with an explicit timestamp.
    ///
    /// Fails with [`Error::UnknownDevice`] if the device is not registered.
    pub fn add_sample_at(
        &self,
        device_number: DeviceNumber,
        temperature_c: f64,
        humidity_percent: f64,
        recorded_at: OffsetDateTime,
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        if !device_exists(&tx, device_number)? {
            return Err(Error::UnknownDevice(device_number));
        }

        tx.execute(
            "INSERT INTO samples (device_number, recorded_at, temperature_c, humidity_percent)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                device_number.get(),
                to_millis(recorded_at),
                temperature_c,
                humidity_percent
            ],
        )?;

        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Query samples with filters.
    pub fn query_samples(&self, query: &SampleQuery) -> Result<Vec<NamedSample>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let samples = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(NamedSample {
                    id: row.get(0)?,
                    device_number: DeviceNumber::new(row.get(1)?),
                    radio_address: row.get(2)?,
                    friendly_name: row.get(3)?,
                    temperature_c: row.get(4)?,
                    humidity_percent: row.get(5)?,
                    recorded_at: from_millis(row.get(6)?, 6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    /// Samples recorded between `begin` and `end` inclusive, oldest first,
    /// with each device's current friendly name.
    pub fn samples_in_range(
        &self,
        begin: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<NamedSample>> {
        self.query_samples(&SampleQuery::range(begin, end))
    }

    /// The most recent sample of one device.
    pub fn latest_sample(&self, device_number: DeviceNumber) -> Result<Option<StoredSample>> {
        let query = SampleQuery::new().device(device_number).limit(1);
        let mut samples = self.query_samples(&query)?;
        Ok(samples.pop().map(StoredSample::from))
    }

    /// The most recent sample of every device that has one.
    ///
    /// "Most recent" is the greatest `recorded_at`; ties go to the sample
    /// inserted last.
    pub fn latest_sample_per_device(&self) -> Result<BTreeMap<DeviceNumber, StoredSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, device_number, temperature_c, humidity_percent, recorded_at
             FROM (
                 SELECT s.*, ROW_NUMBER() OVER (
                     PARTITION BY device_number
                     ORDER BY recorded_at DESC, id DESC
                 ) AS rn
                 FROM samples s
             )
             WHERE rn = 1",
        )?;

        let latest = stmt
            .query_map([], |row| {
                Ok(StoredSample {
                    id: row.get(0)?,
                    device_number: DeviceNumber::new(row.get(1)?),
                    temperature_c: row.get(2)?,
                    humidity_percent: row.get(3)?,
                    recorded_at: from_millis(row.get(4)?, 4)?,
                })
            })?
            .map(|sample| sample.map(|s| (s.device_number, s)))
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        Ok(latest)
    }

    /// Count samples, optionally for a single device.
    pub fn count_samples(&self, device_number: Option<DeviceNumber>) -> Result<u64> {
        let count: i64 = match device_number {
            Some(number) => self.conn.query_row(
                "SELECT COUNT(*) FROM samples WHERE device_number = ?",
                [number.get()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Write the samples between `begin` and `end` as CSV.
    ///
    /// Returns the number of data rows written.
    pub fn export_samples_csv<W: Write>(
        &self,
        begin: OffsetDateTime,
        end: OffsetDateTime,
        writer: W,
    ) -> Result<usize> {
        let samples = self.samples_in_range(begin, end)?;
        let mut wtr = csv::Writer::from_writer(writer);

        for sample in &samples {
            let recorded_at = sample
                .recorded_at
                .format(&Rfc3339)
                .map_err(std::io::Error::other)?;
            wtr.serialize(CsvRow {
                device_number: sample.device_number.get(),
                name: &sample.friendly_name,
                recorded_at,
                temperature_c: sample.temperature_c,
                humidity_percent: sample.humidity_percent,
            })?;
        }

        wtr.flush()?;
        Ok(samples.len())
    }
}

/// Convert a timestamp to Unix milliseconds.
pub(crate) fn to_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(millis: i64, column: usize) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Integer, Box::new(e)))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn device_exists(conn: &Connection, device_number: DeviceNumber) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM devices WHERE device_number = ?",
        [device_number.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn named_device_from_row(row: &Row<'_>) -> rusqlite::Result<NamedDevice> {
    Ok(NamedDevice {
        device_number: DeviceNumber::new(row.get(0)?),
        radio_address: row.get(1)?,
        friendly_name: row.get(2)?,
    })
}
