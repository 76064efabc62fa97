//! Query builder for stored samples.
//!
//! [`SampleQuery`] follows the builder pattern for filtering and paginating
//! samples. Results are always joined with the device's radio address and
//! current friendly name.
//!
//! # Example
//!
//! ```
//! use sensorpush_store::{SampleQuery, Store};
//! use sensorpush_types::DeviceNumber;
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = SampleQuery::new()
//!     .device(DeviceNumber::new(1))
//!     .since(yesterday)
//!     .limit(50);
//!
//! let samples = store.query_samples(&query)?;
//! assert!(samples.is_empty());
//! # Ok::<(), sensorpush_store::Error>(())
//! ```

use time::OffsetDateTime;

use sensorpush_types::DeviceNumber;

use crate::store::to_millis;

/// Fluent query builder for samples.
///
/// Use this to construct queries for
/// [`Store::query_samples`](crate::Store::query_samples). All filter methods
/// are optional and can be chained in any order. Time bounds are inclusive.
///
/// By default, queries return results ordered by `recorded_at` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct SampleQuery {
    /// Filter by device number.
    pub device_number: Option<DeviceNumber>,
    /// Filter samples at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter samples at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by recorded_at descending (newest first).
    pub newest_first: bool,
}

impl SampleQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - No device filter (all devices)
    /// - No time range filter
    /// - No limit (all matching records)
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Samples between `begin` and `end`, both inclusive, oldest first.
    pub fn range(begin: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self::new().since(begin).until(end).oldest_first()
    }

    /// Filter by device number.
    pub fn device(mut self, device_number: DeviceNumber) -> Self {
        self.device_number = Some(device_number);
        self
    }

    /// Filter to samples recorded at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to samples recorded at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    ///
    /// Use with `limit()` for pagination. For example, to get page 2
    /// with 50 items per page: `.limit(50).offset(50)`.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first (ascending by `recorded_at`).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(number) = self.device_number {
            conditions.push("s.device_number = ?");
            params.push(Box::new(number.get()));
        }

        if let Some(since) = self.since {
            conditions.push("s.recorded_at >= ?");
            params.push(Box::new(to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("s.recorded_at <= ?");
            params.push(Box::new(to_millis(until)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT s.id, s.device_number, d.radio_address, COALESCE(dn.name, ''), \
             s.temperature_c, s.humidity_percent, s.recorded_at \
             FROM samples s \
             JOIN devices d ON d.device_number = s.device_number \
             LEFT JOIN device_names dn ON dn.device_number = s.device_number \
             {} ORDER BY s.recorded_at {}, s.id {}",
            where_clause, order, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            // SQLite only accepts OFFSET after a LIMIT clause.
            if self.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}
