//! # Collaborator Interfaces
//!
//! Trait abstraction for the external services the pipeline talks to, so the
//! orchestrator can be driven without any live network or storage.
//!
//! This module handles:
//! - Fragment persistence and window range queries
//! - Geolocation resolution of beacon sets and nav messages
//! - Publication of resolved locations

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::fragment::window::FragmentQuery;
use crate::location::ResolvedLocation;
use crate::uplink::protocol::{DecodedUplink, WifiBeacon};

pub mod store;
pub mod oracle;
pub mod sink;

pub use oracle::{StaticOracle, UnavailableOracle};
pub use sink::{DedupingSink, JsonlSink};
pub use store::InMemoryFragmentStore;

/// Persistence of decoded records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Insert or replace a record keyed by (device_id, timestamp)
    async fn upsert(&self, record: &DecodedUplink) -> Result<()>;

    /// All records for the device inside the sequence range, no older than the bound
    async fn query(&self, query: &FragmentQuery) -> Result<Vec<DecodedUplink>>;
}

/// External geolocation service
///
/// Answers are the service's raw GeoJSON payloads, see
/// [`OracleResponse::from_geojson`](crate::location::OracleResponse::from_geojson).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeolocationOracle: Send + Sync {
    async fn resolve_wifi(&self, beacons: &[WifiBeacon], timestamp_ms: u64) -> Result<Value>;

    async fn resolve_gnss(&self, nav_message: &str, capture_time_s: u64) -> Result<Value>;
}

/// Result of handing a location to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Published,
    /// Already published for this device and timestamp
    Suppressed,
}

/// Destination of resolved locations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, topic: &str, location: &ResolvedLocation) -> Result<Delivery>;
}
