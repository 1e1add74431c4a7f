//! Offline geolocation oracles
//!
//! [`StaticOracle`] answers every request with one fixed position, shaped
//! exactly like the real service's payloads (including its per-kind
//! coordinate order), so replayed traffic exercises the full normalization
//! path.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::GeolocationOracle;
use crate::config::OracleConfig;
use crate::error::{Result, TrackerError};
use crate::uplink::protocol::WifiBeacon;

/// Oracle returning a fixed position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticOracle {
    latitude: f64,
    longitude: f64,
    horizontal_accuracy: f64,
}

impl StaticOracle {
    pub fn new(latitude: f64, longitude: f64, horizontal_accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            horizontal_accuracy,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(config.latitude, config.longitude, config.horizontal_accuracy)
    }
}

#[async_trait]
impl GeolocationOracle for StaticOracle {
    async fn resolve_wifi(&self, beacons: &[WifiBeacon], timestamp_ms: u64) -> Result<Value> {
        if beacons.is_empty() {
            return Err(TrackerError::Resolution("No WiFi access points supplied".to_string()));
        }
        debug!("Static WiFi resolution for {} beacons at {}", beacons.len(), timestamp_ms);

        // WiFi answers use GeoJSON order: [longitude, latitude]
        Ok(json!({
            "type": "Point",
            "coordinates": [self.longitude, self.latitude],
            "properties": { "horizontalAccuracy": self.horizontal_accuracy }
        }))
    }

    async fn resolve_gnss(&self, nav_message: &str, capture_time_s: u64) -> Result<Value> {
        if nav_message.is_empty() {
            return Err(TrackerError::Resolution("Empty GNSS nav message".to_string()));
        }
        debug!("Static GNSS resolution for {} hex chars captured at {}", nav_message.len(), capture_time_s);

        // GNSS answers come back as [latitude, longitude]
        Ok(json!({
            "location": {
                "type": "Point",
                "coordinates": [self.latitude, self.longitude],
                "properties": { "horizontalAccuracy": self.horizontal_accuracy }
            }
        }))
    }
}

/// Oracle used when no geolocation service is reachable
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl GeolocationOracle for UnavailableOracle {
    async fn resolve_wifi(&self, _beacons: &[WifiBeacon], _timestamp_ms: u64) -> Result<Value> {
        Err(TrackerError::Collaborator("Geolocation oracle unavailable".to_string()))
    }

    async fn resolve_gnss(&self, _nav_message: &str, _capture_time_s: u64) -> Result<Value> {
        Err(TrackerError::Collaborator("Geolocation oracle unavailable".to_string()))
    }
}
