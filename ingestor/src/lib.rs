//! Soil moisture ingestion: subscribes to a telemetry topic, persists each
//! valid reading to PostgreSQL and raises dry/wet alerts.

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod pipeline;
pub mod rest;
pub mod supervisor;
pub mod threshold;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;
