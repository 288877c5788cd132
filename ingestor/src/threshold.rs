use crate::errors::{Error, Result};
use crate::model::Reading;
use std::fmt;

pub const DEFAULT_DRY_LIMIT: i64 = 450;
pub const DEFAULT_WET_LIMIT: i64 = 850;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoistureLevel {
    Dry,
    Wet,
    Nominal,
}

/// Fixed dry/wet bounds. Both bounds are themselves nominal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub dry_limit: i64,
    pub wet_limit: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dry_limit: DEFAULT_DRY_LIMIT,
            wet_limit: DEFAULT_WET_LIMIT,
        }
    }
}

impl Thresholds {
    pub fn new(dry_limit: i64, wet_limit: i64) -> Result<Self> {
        if dry_limit >= wet_limit {
            return Err(Error::Config(format!(
                "DRY_LIMIT ({}) must be below WET_LIMIT ({})",
                dry_limit, wet_limit
            )));
        }
        Ok(Self {
            dry_limit,
            wet_limit,
        })
    }

    pub fn classify(&self, moisture: i64) -> MoistureLevel {
        if moisture < self.dry_limit {
            MoistureLevel::Dry
        } else if moisture > self.wet_limit {
            MoistureLevel::Wet
        } else {
            MoistureLevel::Nominal
        }
    }

    /// Every out-of-range reading yields an alert; there is no de-duplication.
    pub fn evaluate(&self, reading: &Reading) -> Option<Alert> {
        match self.classify(reading.moisture) {
            MoistureLevel::Nominal => None,
            level => Some(Alert {
                device_id: reading.device_id.clone(),
                moisture: reading.moisture,
                level,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub device_id: String,
    pub moisture: i64,
    pub level: MoistureLevel,
}

impl Alert {
    pub fn action(&self) -> &'static str {
        match self.level {
            MoistureLevel::Dry => "Start irrigation",
            MoistureLevel::Wet => "Stop irrigation",
            MoistureLevel::Nominal => "None",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headline = match self.level {
            MoistureLevel::Dry => "ALERT: soil is too dry",
            MoistureLevel::Wet => "WARNING: soil is too wet",
            MoistureLevel::Nominal => "soil moisture nominal",
        };
        write!(
            f,
            "{} | Device: {} | Moisture: {} | Action: {}",
            headline,
            self.device_id,
            self.moisture,
            self.action()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reading(moisture: i64) -> Reading {
        Reading {
            device_id: "A1".to_string(),
            moisture,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_boundaries_are_nominal() {
        let t = Thresholds::default();
        assert_eq!(t.classify(450), MoistureLevel::Nominal);
        assert_eq!(t.classify(850), MoistureLevel::Nominal);
        assert_eq!(t.classify(449), MoistureLevel::Dry);
        assert_eq!(t.classify(851), MoistureLevel::Wet);
    }

    #[test]
    fn test_dry_alert_text() {
        let alert = Thresholds::default().evaluate(&reading(300)).unwrap();

        assert_eq!(alert.level, MoistureLevel::Dry);
        assert_eq!(
            alert.to_string(),
            "ALERT: soil is too dry | Device: A1 | Moisture: 300 | Action: Start irrigation"
        );
    }

    #[test]
    fn test_wet_alert_text() {
        let alert = Thresholds::default().evaluate(&reading(900)).unwrap();

        assert_eq!(alert.level, MoistureLevel::Wet);
        assert!(alert.to_string().contains("Stop irrigation"));
    }

    #[test]
    fn test_values_beyond_column_range_still_classify() {
        let t = Thresholds::default();
        assert_eq!(t.classify(3_000_000_000), MoistureLevel::Wet);
        assert_eq!(t.classify(-3_000_000_000), MoistureLevel::Dry);
    }

    #[test]
    fn test_nominal_has_no_alert() {
        assert!(Thresholds::default().evaluate(&reading(600)).is_none());
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(Thresholds::new(500, 500).is_err());
        assert!(Thresholds::new(600, 500).is_err());
        assert!(Thresholds::new(100, 200).is_ok());
    }

    proptest! {
        #[test]
        fn prop_below_dry_is_dry(m in i64::MIN..DEFAULT_DRY_LIMIT) {
            prop_assert_eq!(Thresholds::default().classify(m), MoistureLevel::Dry);
        }

        #[test]
        fn prop_above_wet_is_wet(m in (DEFAULT_WET_LIMIT + 1)..=i64::MAX) {
            prop_assert_eq!(Thresholds::default().classify(m), MoistureLevel::Wet);
        }

        #[test]
        fn prop_between_is_nominal(m in DEFAULT_DRY_LIMIT..=DEFAULT_WET_LIMIT) {
            prop_assert_eq!(Thresholds::default().classify(m), MoistureLevel::Nominal);
        }
    }
}
