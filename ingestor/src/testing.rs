//! In-memory store used by unit tests in place of PostgreSQL.

use crate::db::{Connector, ReadingStore};
use crate::errors::{Error, Result};
use crate::model::{Reading, StoredReading};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    rows: Vec<StoredReading>,
    /// Generation of the session the "server" currently accepts.
    generation: u64,
    open: bool,
    connects: usize,
    schema_calls: usize,
    failing_connects: usize,
    failing_appends: usize,
    hanging_checks: usize,
    hanging_appends: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

impl MemoryConnector {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn rows(&self) -> Vec<StoredReading> {
        self.state().rows.clone()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn schema_calls(&self) -> usize {
        self.state().schema_calls
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    /// Drops the current session from the server side.
    pub fn kill_connection(&self) {
        self.state().open = false;
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.state().failing_connects = n;
    }

    pub fn fail_next_appends(&self, n: usize) {
        self.state().failing_appends = n;
    }

    /// The next `n` liveness checks never complete.
    pub fn hang_next_checks(&self, n: usize) {
        self.state().hanging_checks = n;
    }

    /// The next `n` inserts never complete.
    pub fn hang_next_appends(&self, n: usize) {
        self.state().hanging_appends = n;
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore> {
        let mut state = self.state();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::ConnectionUnavailable("connection refused".to_string()));
        }
        state.connects += 1;
        state.generation += 1;
        state.open = true;
        Ok(MemoryStore {
            state: Arc::clone(&self.state),
            generation: state.generation,
        })
    }
}

pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    generation: u64,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn take_one(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn is_closed(&mut self) -> bool {
        let hang = Self::take_one(&mut self.state().hanging_checks);
        if hang {
            std::future::pending::<()>().await;
        }
        let state = self.state();
        !state.open || state.generation != self.generation
    }

    async fn ensure_schema(&mut self) -> Result<()> {
        self.state().schema_calls += 1;
        Ok(())
    }

    async fn append(&mut self, reading: &Reading) -> Result<i32> {
        let hang = Self::take_one(&mut self.state().hanging_appends);
        if hang {
            std::future::pending::<()>().await;
        }
        let generation = self.generation;
        let mut state = self.state();
        if !state.open || state.generation != generation {
            return Err(Error::ConnectionUnavailable("connection closed".to_string()));
        }
        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(Error::Database(sqlx::Error::Protocol(
                "simulated insert failure".to_string(),
            )));
        }
        let timestamp = reading
            .recorded_at()
            .ok_or_else(|| Error::Unstorable("timestamp out of range".to_string()))?;
        let moisture = reading
            .stored_moisture()
            .ok_or_else(|| Error::Unstorable("moisture out of range".to_string()))?;
        let id = state.rows.len() as i32 + 1;
        state.rows.push(StoredReading {
            id,
            device_id: reading.device_id.clone(),
            moisture,
            timestamp,
        });
        Ok(id)
    }

    async fn close(&mut self) -> Result<()> {
        let generation = self.generation;
        let mut state = self.state();
        if state.generation == generation {
            state.open = false;
        }
        Ok(())
    }
}
