use crate::db::{Connector, ReadingStore};
use crate::errors::{Error, Result};
use crate::metrics::STORE_RECONNECTS_TOTAL;
use crate::model::Reading;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Owns the one store session used for ingestion and replaces it whenever it
/// is found closed. Every store call is bounded by `op_timeout`; a session
/// that does not answer in time is treated as closed.
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    current: Option<C::Store>,
    op_timeout: Duration,
    reconnects: u64,
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Opens the initial session and ensures the schema. Any failure here is
    /// meant to abort startup.
    pub async fn start(connector: C, op_timeout: Duration) -> Result<Self> {
        let mut store = timeout(op_timeout, connector.connect())
            .await
            .map_err(|_| Error::Timeout(op_timeout))??;
        timeout(op_timeout, store.ensure_schema())
            .await
            .map_err(|_| Error::Timeout(op_timeout))??;
        Ok(Self {
            connector,
            current: Some(store),
            op_timeout,
            reconnects: 0,
        })
    }

    /// Returns a usable session, reconnecting first if the held one is closed.
    pub async fn ensure_live(&mut self) -> Result<&mut C::Store> {
        let live = match self.current.as_mut() {
            Some(store) => match timeout(self.op_timeout, store.is_closed()).await {
                Ok(closed) => !closed,
                Err(_) => {
                    warn!("Database liveness check timed out after {:?}", self.op_timeout);
                    false
                }
            },
            None => false,
        };

        if !live {
            self.current = None;
            self.reconnects += 1;
            STORE_RECONNECTS_TOTAL.inc();
            warn!("Database connection closed. Reconnecting...");

            match timeout(self.op_timeout, self.connector.connect()).await {
                Ok(Ok(store)) => {
                    info!("Database connection re-established");
                    self.current = Some(store);
                }
                Ok(Err(e)) => {
                    error!("Database reconnect failed: {}", e);
                    return Err(Error::ConnectionUnavailable(e.to_string()));
                }
                Err(_) => {
                    error!("Database reconnect timed out after {:?}", self.op_timeout);
                    return Err(Error::ConnectionUnavailable(
                        Error::Timeout(self.op_timeout).to_string(),
                    ));
                }
            }
        }

        self.current
            .as_mut()
            .ok_or_else(|| Error::ConnectionUnavailable("no database connection".to_string()))
    }

    /// Appends through the live session. A write that times out discards the
    /// session so the next call reconnects.
    pub async fn append(&mut self, reading: &Reading) -> Result<i32> {
        let op_timeout = self.op_timeout;
        let store = self.ensure_live().await?;

        let outcome = timeout(op_timeout, store.append(reading)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.current = None;
                Err(Error::Timeout(op_timeout))
            }
        }
    }

    /// Number of reconnect attempts made since startup.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Closes the held session. Failures are logged, not returned.
    pub async fn close(&mut self) {
        if let Some(mut store) = self.current.take() {
            match timeout(self.op_timeout, store.close()).await {
                Ok(Ok(())) => info!("Database connection closed"),
                Ok(Err(e)) => warn!("Error while closing database connection: {}", e),
                Err(_) => warn!("Timed out closing database connection"),
            }
        }
    }
}
