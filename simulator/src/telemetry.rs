use rand::Rng;
use serde::{Deserialize, Serialize};

/// Wire format shared with the ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilReading {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub moisture: i32,
    pub timestamp: i64,
}

impl SoilReading {
    /// Uniformly random moisture in `min..=max`, stamped with `timestamp`.
    pub fn random(rng: &mut impl Rng, device_id: &str, min: i32, max: i32, timestamp: i64) -> Self {
        Self {
            device_id: device_id.to_string(),
            moisture: rng.gen_range(min..=max),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let reading = SoilReading {
            device_id: "SIMULATOR_01".to_string(),
            moisture: 512,
            timestamp: 1_700_000_000,
        };

        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(
            json,
            r#"{"deviceId":"SIMULATOR_01","moisture":512,"timestamp":1700000000}"#
        );
    }

    #[test]
    fn test_random_moisture_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let reading = SoilReading::random(&mut rng, "dev", 300, 900, 1);
            assert!((300..=900).contains(&reading.moisture));
        }
    }
}
