use crate::db::Connector;
use crate::errors::Error;
use crate::metrics::{
    DB_FAILURES_TOTAL, DRY_ALERTS_TOTAL, INVALID_MESSAGES_TOTAL, VALID_MESSAGES_TOTAL,
    WET_ALERTS_TOTAL,
};
use crate::model::Reading;
use crate::supervisor::ConnectionSupervisor;
use crate::threshold::{Alert, MoistureLevel, Thresholds};
use crate::validate::parse_reading;
use tracing::{error, info, warn};

/// What happened to one message.
#[derive(Debug)]
pub enum HandleResult {
    /// The payload did not decode into a reading. Nothing was stored.
    Rejected(Error),
    /// The payload was a valid reading. `row_id` is `None` when the store
    /// write failed; the alert is evaluated either way.
    Accepted {
        reading: Reading,
        row_id: Option<i32>,
        alert: Option<Alert>,
    },
}

impl HandleResult {
    pub fn is_persisted(&self) -> bool {
        matches!(self, HandleResult::Accepted { row_id: Some(_), .. })
    }
}

/// Validates, persists and evaluates a single raw message. Never fails: every
/// error is logged and reported through the result.
pub async fn handle<C: Connector>(
    payload: &[u8],
    supervisor: &mut ConnectionSupervisor<C>,
    thresholds: &Thresholds,
) -> HandleResult {
    let reading = match parse_reading(payload) {
        Ok(reading) => reading,
        Err(e) => {
            warn!("Dropping message: {}", e);
            INVALID_MESSAGES_TOTAL.inc();
            return HandleResult::Rejected(e);
        }
    };

    VALID_MESSAGES_TOTAL.inc();
    info!(
        "Data received: {}, moisture: {}",
        reading.device_id, reading.moisture
    );

    let row_id = persist(&reading, supervisor).await;

    let alert = thresholds.evaluate(&reading);
    if let Some(alert) = &alert {
        match alert.level {
            MoistureLevel::Dry => DRY_ALERTS_TOTAL.inc(),
            MoistureLevel::Wet => WET_ALERTS_TOTAL.inc(),
            MoistureLevel::Nominal => {}
        }
        warn!("{}", alert);
    }

    HandleResult::Accepted {
        reading,
        row_id,
        alert,
    }
}

async fn persist<C: Connector>(
    reading: &Reading,
    supervisor: &mut ConnectionSupervisor<C>,
) -> Option<i32> {
    match supervisor.append(reading).await {
        Ok(id) => Some(id),
        Err(e @ Error::ConnectionUnavailable(_)) => {
            error!(
                "Cannot insert reading from {}, no database connection: {}",
                reading.device_id, e
            );
            DB_FAILURES_TOTAL.inc();
            None
        }
        Err(e) => {
            error!(
                "Failed to insert reading from {}: {}",
                reading.device_id, e
            );
            DB_FAILURES_TOTAL.inc();
            None
        }
    }
}
