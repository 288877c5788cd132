use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One validated soil moisture sample. Values are kept as sent; range limits
/// of the store are checked only when the reading is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub device_id: String,
    pub moisture: i64,
    /// Seconds since the Unix epoch, as sent on the wire.
    pub timestamp: i64,
}

impl Reading {
    /// The sample time as a UTC wall-clock value for the `TIMESTAMP` column.
    pub fn recorded_at(&self) -> Option<NaiveDateTime> {
        DateTime::from_timestamp(self.timestamp, 0).map(|dt| dt.naive_utc())
    }

    /// The moisture value if it fits the `INTEGER` column.
    pub fn stored_moisture(&self) -> Option<i32> {
        i32::try_from(self.moisture).ok()
    }
}

/// A row of the `readings` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredReading {
    pub id: i32,
    pub device_id: String,
    pub moisture: i32,
    pub timestamp: NaiveDateTime,
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub data: Vec<StoredReading>,
    pub total: usize,
    pub window_minutes: i64,
}
