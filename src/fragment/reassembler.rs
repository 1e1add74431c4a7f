//! # Fragment Reassembler
//!
//! Merges a complete fragment group into one location-resolution request.

use tracing::debug;

use super::window::{FragmentGroup, KindFamily};
use crate::error::{Result, TrackerError};
use crate::location::Origin;
use crate::uplink::protocol::{DecodedUplink, WifiBeacon};

/// Combined payload of a fragment group
#[derive(Debug, Clone, PartialEq)]
pub enum Reassembled {
    /// Every beacon carried by the group, unordered, duplicates kept
    WifiBeaconSet {
        device_id: String,
        beacons: Vec<WifiBeacon>,
        timestamp_ms: u64,
        battery_pct: u8,
    },

    /// Full navigation message, fragments concatenated in sequence order
    GnssMessage {
        device_id: String,
        nav_message: String,
        capture_time_s: u64,
        timestamp_ms: u64,
        battery_pct: u8,
    },
}

impl Reassembled {
    pub fn origin(&self) -> Origin {
        match self {
            Reassembled::WifiBeaconSet { .. } => Origin::Wifi,
            Reassembled::GnssMessage { .. } => Origin::Gnss,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Reassembled::WifiBeaconSet { device_id, .. } | Reassembled::GnssMessage { device_id, .. } => device_id,
        }
    }

    /// Group timestamp (the head fragment's receipt time)
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Reassembled::WifiBeaconSet { timestamp_ms, .. } | Reassembled::GnssMessage { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }

    pub fn battery_pct(&self) -> u8 {
        match self {
            Reassembled::WifiBeaconSet { battery_pct, .. } | Reassembled::GnssMessage { battery_pct, .. } => {
                *battery_pct
            }
        }
    }
}

/// Reassemble a complete group
///
/// The head is the fragment with the lowest sequence number; it must carry
/// the sensor block (and, for GNSS, the capture time).
///
/// # Errors
///
/// Returns `TrackerError::MissingHead` if the lowest fragment is not a head,
/// typically because the real head aged out of the window.
pub fn reassemble(group: &FragmentGroup) -> Result<Reassembled> {
    let missing_head = || TrackerError::MissingHead {
        device_id: group.key.device_id.clone(),
        first_seq: group.key.first_seq,
        last_seq: group.key.last_seq,
    };

    let mut ordered: Vec<&DecodedUplink> = group.fragments.iter().collect();
    ordered.sort_by_key(|record| record.sequence_number);

    let head = *ordered.first().ok_or_else(missing_head)?;
    let sensors = match head.sensor_block {
        Some(sensors) if head.is_head() => sensors,
        _ => return Err(missing_head()),
    };

    let reassembled = match group.key.family {
        KindFamily::Wifi => {
            let beacons: Vec<WifiBeacon> = ordered
                .iter()
                .flat_map(|record| record.beacons().iter().copied())
                .collect();

            Reassembled::WifiBeaconSet {
                device_id: head.device_id.clone(),
                beacons,
                timestamp_ms: head.timestamp_ms,
                battery_pct: sensors.battery_pct,
            }
        }
        KindFamily::Gnss => {
            let capture_time_s = head
                .gnss()
                .and_then(|fragment| fragment.capture_time_s)
                .ok_or_else(missing_head)?;

            let nav_message: String = ordered
                .iter()
                .filter_map(|record| record.gnss())
                .map(|fragment| fragment.nav_fragment.as_str())
                .collect();

            Reassembled::GnssMessage {
                device_id: head.device_id.clone(),
                nav_message,
                capture_time_s,
                timestamp_ms: head.timestamp_ms,
                battery_pct: sensors.battery_pct,
            }
        }
    };

    debug!(
        "Reassembled {} fragments for {} ({:?})",
        ordered.len(),
        group.key.device_id,
        group.key.family
    );

    Ok(reassembled)
}
