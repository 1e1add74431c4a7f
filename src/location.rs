//! # Location Normalizer
//!
//! Turns a geolocation oracle answer into a canonical [`ResolvedLocation`].
//!
//! The oracle's coordinate order depends on the request kind: WiFi answers
//! come back as `[longitude, latitude]` (GeoJSON order) while GNSS answers
//! come back as `[latitude, longitude]`. That asymmetry matches what the
//! upstream provider actually returns and must not be "fixed" here.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TrackerError};

/// Request kind that produced an oracle answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Wifi,
    Gnss,
}

/// Raw oracle answer, coordinates in the oracle's own order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OracleResponse {
    pub coordinates: [f64; 2],
    pub horizontal_accuracy: f64,
}

impl OracleResponse {
    /// Extract coordinates and accuracy from the oracle's GeoJSON payload
    ///
    /// WiFi answers are a bare GeoJSON point; GNSS answers nest it under
    /// `"location"`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Resolution` if the payload lacks a coordinate
    /// pair or a horizontal accuracy.
    pub fn from_geojson(payload: &Value, origin: Origin) -> Result<Self> {
        let point = match origin {
            Origin::Wifi => payload,
            Origin::Gnss => payload
                .get("location")
                .ok_or_else(|| TrackerError::Resolution("GNSS answer has no location".to_string()))?,
        };

        let coordinates = point
            .get("coordinates")
            .and_then(Value::as_array)
            .ok_or_else(|| TrackerError::Resolution("Answer has no coordinates".to_string()))?;

        let [first, second] = coordinates.as_slice() else {
            return Err(TrackerError::Resolution(format!(
                "Expected a coordinate pair, got {} values",
                coordinates.len()
            )));
        };

        let (Some(first), Some(second)) = (first.as_f64(), second.as_f64()) else {
            return Err(TrackerError::Resolution("Coordinates are not numeric".to_string()));
        };

        let horizontal_accuracy = point
            .get("properties")
            .and_then(|properties| properties.get("horizontalAccuracy"))
            .and_then(Value::as_f64)
            .ok_or_else(|| TrackerError::Resolution("Answer has no horizontalAccuracy".to_string()))?;

        Ok(Self {
            coordinates: [first, second],
            horizontal_accuracy,
        })
    }
}

/// Canonical resolved location, latitude first
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub device_id: String,
    pub timestamp_ms: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub battery_pct: u8,
}

/// Request context the normalizer needs besides the oracle answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationContext {
    pub device_id: String,
    pub timestamp_ms: u64,
    pub battery_pct: u8,
}

/// Map an oracle answer to a canonical location
pub fn normalize(response: &OracleResponse, origin: Origin, context: LocationContext) -> ResolvedLocation {
    let [first, second] = response.coordinates;
    let (latitude, longitude) = match origin {
        Origin::Wifi => (second, first),
        Origin::Gnss => (first, second),
    };

    ResolvedLocation {
        device_id: context.device_id,
        timestamp_ms: context.timestamp_ms,
        latitude,
        longitude,
        horizontal_accuracy: response.horizontal_accuracy,
        battery_pct: context.battery_pct,
    }
}

/// Published message shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMessage {
    pub device_id: String,
    pub timestamp: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Accuracy,
    pub position_properties: PositionProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accuracy {
    pub horizontal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionProperties {
    pub battery_level: u8,
}

impl From<&ResolvedLocation> for LocationMessage {
    fn from(location: &ResolvedLocation) -> Self {
        Self {
            device_id: location.device_id.clone(),
            timestamp: location.timestamp_ms,
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy: Accuracy {
                horizontal: location.horizontal_accuracy,
            },
            position_properties: PositionProperties {
                battery_level: location.battery_pct,
            },
        }
    }
}
