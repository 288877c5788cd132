use crate::errors::{Error, Result};
use crate::metrics::APPEND_LATENCY_SECONDS;
use crate::model::{Reading, StoredReading};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnection, PgExecutor, PgPool, PgPoolOptions};
use sqlx::Connection;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = include_str!("../migrations/20240101000000_create_readings.sql");

/// A single session with the readings store.
#[async_trait]
pub trait ReadingStore: Send {
    /// Whether the session can no longer be used and must be replaced.
    async fn is_closed(&mut self) -> bool;

    /// Creates the readings table if absent. Safe to call repeatedly.
    async fn ensure_schema(&mut self) -> Result<()>;

    /// Inserts one row and returns its id once the write is committed.
    async fn append(&mut self, reading: &Reading) -> Result<i32>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens new store sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Store: ReadingStore;

    async fn connect(&self) -> Result<Self::Store>;
}

pub struct PgConnector {
    database_url: String,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            database_url: database_url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Store = PgStore;

    async fn connect(&self) -> Result<PgStore> {
        info!("Connecting to database...");
        let conn = tokio::time::timeout(
            self.connect_timeout,
            PgConnection::connect(&self.database_url),
        )
        .await
        .map_err(|_| Error::Timeout(self.connect_timeout))??;

        info!("Database connection established");
        Ok(PgStore {
            conn: Some(conn),
            broken: false,
        })
    }
}

pub struct PgStore {
    conn: Option<PgConnection>,
    broken: bool,
}

impl PgStore {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::ConnectionUnavailable("connection already closed".to_string()))
    }

    /// Marks the session broken when `err` means the connection itself is gone.
    fn observe(&mut self, err: Error) -> Error {
        if let Error::Database(db_err) = &err {
            if is_connection_error(db_err) {
                warn!("Database connection lost: {}", db_err);
                self.broken = true;
            }
        }
        err
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn is_closed(&mut self) -> bool {
        if self.broken {
            return true;
        }
        let Some(conn) = self.conn.as_mut() else {
            return true;
        };
        if let Err(e) = conn.ping().await {
            debug!("Database ping failed: {}", e);
            self.broken = true;
        }
        self.broken
    }

    async fn ensure_schema(&mut self) -> Result<()> {
        info!("Setting up database table...");
        let conn = self.conn()?;
        let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(SCHEMA_SQL)).await;
        if let Err(e) = result {
            return Err(self.observe(Error::Database(e)));
        }
        info!("Database setup complete");
        Ok(())
    }

    async fn append(&mut self, reading: &Reading) -> Result<i32> {
        let recorded_at = reading.recorded_at().ok_or_else(|| {
            Error::Unstorable(format!("timestamp {} is out of range", reading.timestamp))
        })?;
        let moisture = reading.stored_moisture().ok_or_else(|| {
            Error::Unstorable(format!("moisture {} does not fit INTEGER", reading.moisture))
        })?;

        let start = Instant::now();
        let conn = self.conn()?;

        // Autocommit: the row is durable once RETURNING yields its id
        let result = sqlx::query_scalar::<_, i32>(
            "INSERT INTO readings (device_id, moisture, timestamp) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&reading.device_id)
        .bind(moisture)
        .bind(recorded_at)
        .fetch_one(conn)
        .await;

        match result {
            Ok(id) => {
                APPEND_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
                Ok(id)
            }
            Err(e) => Err(self.observe(Error::Database(e))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.broken = true;
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

/// Small pool for the read API. Ingestion never goes through it.
pub async fn make_pool(database_url: &str, acquire_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Rows recorded at or after `since`, oldest first.
pub async fn recent_readings<'e, E>(
    executor: E,
    since: NaiveDateTime,
    device_id: Option<&str>,
    limit: i64,
) -> Result<Vec<StoredReading>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT id, device_id, moisture, timestamp
        FROM readings
        WHERE timestamp >= $1 AND ($2::text IS NULL OR device_id = $2)
        ORDER BY timestamp ASC, id ASC
        LIMIT $3
        "#,
    )
    .bind(since)
    .bind(device_id)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// True when the error means the session is unusable rather than the statement.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            code.starts_with("08") || // connection_exception class
            code == "57P01" || // admin_shutdown
            code == "57P02" || // crash_shutdown
            code == "57P03" // cannot_connect_now
        }),
        _ => false,
    }
}
