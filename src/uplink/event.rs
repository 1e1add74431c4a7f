//! # Frame Source Events
//!
//! JSON envelope in which the wireless network delivers one uplink.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Invocation envelope; only `at_uplink` requests are supported
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEnvelope {
    #[serde(default)]
    pub at_uplink: Option<UplinkEvent>,
}

/// One uplink as delivered by the network server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkEvent {
    #[serde(rename = "WirelessDeviceId")]
    pub device_id: String,

    /// Base64 of the ASCII hex frame
    #[serde(rename = "PayloadData")]
    pub payload_data: String,

    #[serde(rename = "WirelessMetadata")]
    pub metadata: WirelessMetadata,

    /// Receipt time in milliseconds since the Unix epoch
    #[serde(rename = "ReceivedAtMs", default, skip_serializing_if = "Option::is_none")]
    pub received_at_ms: Option<u64>,
}

/// Network metadata attached to an uplink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessMetadata {
    /// Per-device uplink sequence number
    #[serde(rename = "Seq")]
    pub seq: u64,
}

impl InvocationEnvelope {
    /// Parse one JSON invocation and extract its uplink
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Json` for malformed JSON and
    /// `TrackerError::Decode` when the request carries no `at_uplink`.
    pub fn parse_uplink(json: &str) -> Result<UplinkEvent> {
        let envelope: InvocationEnvelope = serde_json::from_str(json)?;
        envelope.at_uplink.ok_or_else(|| {
            TrackerError::Decode("Unsupported request received. Only at_uplink is supported".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uplink() {
        let json = r#"{
            "at_uplink": {
                "WirelessDeviceId": "5a1e7c2d",
                "PayloadData": "NDA1N2VjNTU4YQ==",
                "WirelessMetadata": { "Seq": 118, "LoRaWAN": { "FPort": 2 } }
            }
        }"#;

        let event = InvocationEnvelope::parse_uplink(json).unwrap();
        assert_eq!(event.device_id, "5a1e7c2d");
        assert_eq!(event.payload_data, "NDA1N2VjNTU4YQ==");
        assert_eq!(event.metadata.seq, 118);
        assert_eq!(event.received_at_ms, None);
    }

    #[test]
    fn test_parse_uplink_with_receipt_time() {
        let json = r#"{"at_uplink": {"WirelessDeviceId": "d", "PayloadData": "", "WirelessMetadata": {"Seq": 1}, "ReceivedAtMs": 1700000000000}}"#;
        let event = InvocationEnvelope::parse_uplink(json).unwrap();
        assert_eq!(event.received_at_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_parse_unsupported_request() {
        let result = InvocationEnvelope::parse_uplink(r#"{"other": {}}"#);
        assert!(matches!(result, Err(TrackerError::Decode(_))));
    }

    #[test]
    fn test_parse_malformed_json() {
        let result = InvocationEnvelope::parse_uplink("{not json");
        assert!(matches!(result, Err(TrackerError::Json(_))));
    }
}
