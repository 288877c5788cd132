use crate::errors::{Error, Result};
use crate::model::Reading;
use serde::Deserialize;

/// Payload as published on the topic. Every field is optional here so that a
/// missing field is reported as such instead of as a generic parse error.
#[derive(Debug, Deserialize)]
struct WireReading {
    #[serde(rename = "deviceId")]
    device_id: Option<String>,
    moisture: Option<i64>,
    timestamp: Option<i64>,
}

/// Decodes and validates a raw payload into a [`Reading`].
pub fn parse_reading(payload: &[u8]) -> Result<Reading> {
    let wire = serde_json::from_slice::<WireReading>(payload)
        .map_err(|e| Error::MalformedMessage(format!("JSON parse error: {}", e)))?;

    let device_id = match wire.device_id {
        Some(id) if !id.is_empty() => id,
        Some(_) => {
            return Err(Error::MalformedMessage(
                "deviceId cannot be empty".to_string(),
            ))
        }
        None => return Err(Error::MalformedMessage("missing deviceId".to_string())),
    };

    // Zero is a valid moisture value
    let moisture = wire
        .moisture
        .ok_or_else(|| Error::MalformedMessage("missing moisture".to_string()))?;

    let timestamp = match wire.timestamp {
        Some(0) => return Err(Error::MalformedMessage("timestamp cannot be zero".to_string())),
        Some(ts) => ts,
        None => return Err(Error::MalformedMessage("missing timestamp".to_string())),
    };

    Ok(Reading {
        device_id,
        moisture,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_malformed(payload: &[u8]) {
        match parse_reading(payload) {
            Err(Error::MalformedMessage(_)) => {}
            other => panic!("expected MalformedMessage, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_reading() {
        let reading =
            parse_reading(br#"{"deviceId":"A1","moisture":300,"timestamp":1700000000}"#).unwrap();

        assert_eq!(reading.device_id, "A1");
        assert_eq!(reading.moisture, 300);
        assert_eq!(reading.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_zero_moisture_is_valid() {
        let reading =
            parse_reading(br#"{"deviceId":"A1","moisture":0,"timestamp":1700000000}"#).unwrap();
        assert_eq!(reading.moisture, 0);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let reading = parse_reading(
            br#"{"deviceId":"A1","moisture":512,"timestamp":1700000000,"battery":88}"#,
        )
        .unwrap();
        assert_eq!(reading.moisture, 512);
    }

    #[test]
    fn test_missing_device_id() {
        assert_malformed(br#"{"moisture":900,"timestamp":1700000010}"#);
    }

    #[test]
    fn test_empty_device_id() {
        assert_malformed(br#"{"deviceId":"","moisture":900,"timestamp":1700000010}"#);
    }

    #[test]
    fn test_missing_moisture() {
        assert_malformed(br#"{"deviceId":"A1","timestamp":1700000010}"#);
        assert_malformed(br#"{"deviceId":"A1","moisture":null,"timestamp":1700000010}"#);
    }

    #[test]
    fn test_missing_or_zero_timestamp() {
        assert_malformed(br#"{"deviceId":"A1","moisture":500}"#);
        assert_malformed(br#"{"deviceId":"A1","moisture":500,"timestamp":0}"#);
    }

    #[test]
    fn test_wrong_types() {
        assert_malformed(br#"{"deviceId":42,"moisture":500,"timestamp":1700000010}"#);
        assert_malformed(br#"{"deviceId":"A1","moisture":"500","timestamp":1700000010}"#);
        assert_malformed(br#"{"deviceId":"A1","moisture":500.5,"timestamp":1700000010}"#);
        assert_malformed(br#"{"deviceId":"A1","moisture":500,"timestamp":"1700000010"}"#);
    }

    #[test]
    fn test_not_json() {
        assert_malformed(b"invalid json");
        assert_malformed(b"[1,2,3]");
        assert_malformed(&[0xff, 0xfe, 0x00]);
    }

    #[test]
    fn test_large_integers_accepted() {
        let reading = parse_reading(
            br#"{"deviceId":"A1","moisture":3000000000,"timestamp":99999999999999999}"#,
        )
        .unwrap();
        assert_eq!(reading.moisture, 3_000_000_000);
        assert_eq!(reading.timestamp, 99_999_999_999_999_999);
    }

    #[test]
    fn test_integer_beyond_i64_rejected() {
        assert_malformed(br#"{"deviceId":"A1","moisture":500,"timestamp":99999999999999999999}"#);
    }
}
