//! # Uplink Protocol Constants and Types
//!
//! Core wire definitions for asset tracker uplink frames.
//!
//! Byte 0 of every frame is the header. Its bit layout depends on the
//! decoder generation deployed in the field, see [`HeaderLayout`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary layout: 2-bit kind selector (bits 7-6)
pub const PRIMARY_KIND_MASK: u8 = 0xC0;
pub const PRIMARY_KIND_SHIFT: u8 = 6;

/// Primary layout: 3-bit fragment total (bits 5-3)
pub const FRAGMENT_TOTAL_MASK: u8 = 0x38;
pub const FRAGMENT_TOTAL_SHIFT: u8 = 3;

/// Primary layout: 3-bit fragment index (bits 2-0)
pub const FRAGMENT_INDEX_MASK: u8 = 0x07;

/// Legacy layout: 4-bit kind selector (bits 7-4), low nibble reserved
pub const LEGACY_KIND_MASK: u8 = 0xF0;
pub const LEGACY_KIND_SHIFT: u8 = 4;

/// Fragment index of a head fragment (carries the sensor block)
pub const HEAD_FRAGMENT_INDEX: u8 = 0;

/// Fragment index reserved as "last fragment, trigger reassembly"
pub const TERMINAL_FRAGMENT_INDEX: u8 = 7;

/// MAC address length in bytes
pub const MAC_LEN: usize = 6;

/// Sensor block length: battery, temperature, humidity, motion/accel
pub const SENSOR_BLOCK_LEN: usize = 4;

/// GNSS capture time length (big-endian seconds)
pub const CAPTURE_TIME_LEN: usize = 6;

/// One beacon on the wire: rssi(1) + mac(6)
pub const BEACON_LEN: usize = 1 + MAC_LEN;

/// Minimum frame lengths (header byte included)
pub const NOLOC_FRAME_LEN: usize = 1 + SENSOR_BLOCK_LEN;
pub const WIFI_HEAD_FRAME_LEN: usize = 1 + SENSOR_BLOCK_LEN + 2 * BEACON_LEN;
pub const WIFI_CONTINUATION_FRAME_LEN: usize = 1 + BEACON_LEN;
pub const WIFI_CONTINUATION_PAIR_FRAME_LEN: usize = 1 + 2 * BEACON_LEN;
pub const GNSS_HEAD_FRAME_LEN: usize = 1 + SENSOR_BLOCK_LEN + 1 + CAPTURE_TIME_LEN;
pub const GNSS_CONTINUATION_FRAME_LEN: usize = 2;

/// Motion flag inside the acceleration byte
pub const MOTION_FLAG: u8 = 0x80;

/// Acceleration magnitude inside the acceleration byte (tenths of g)
pub const ACCEL_MASK: u8 = 0x7F;

/// Header bit layout used to split byte 0
///
/// Two incompatible generations of tracker firmware exist. Picking the wrong
/// one misclassifies every frame, so it is always chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// 2-bit kind, 3-bit fragment total, 3-bit fragment index
    Primary,

    /// 4-bit kind, no fragment fields (every frame is self-contained)
    Legacy,
}

impl HeaderLayout {
    /// Split a header byte into its fields
    pub fn parse(self, header: u8) -> FrameHeader {
        match self {
            HeaderLayout::Primary => {
                let selector = (header & PRIMARY_KIND_MASK) >> PRIMARY_KIND_SHIFT;
                FrameHeader {
                    selector,
                    kind: UplinkKind::from_selector(selector),
                    fragment_total: (header & FRAGMENT_TOTAL_MASK) >> FRAGMENT_TOTAL_SHIFT,
                    fragment_index: header & FRAGMENT_INDEX_MASK,
                }
            }
            HeaderLayout::Legacy => {
                let selector = (header & LEGACY_KIND_MASK) >> LEGACY_KIND_SHIFT;
                FrameHeader {
                    selector,
                    kind: UplinkKind::from_selector(selector),
                    fragment_total: 1,
                    fragment_index: HEAD_FRAGMENT_INDEX,
                }
            }
        }
    }
}

impl fmt::Display for HeaderLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderLayout::Primary => write!(f, "primary"),
            HeaderLayout::Legacy => write!(f, "legacy"),
        }
    }
}

/// Parsed header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw kind selector value
    pub selector: u8,

    /// Kind the selector maps to
    pub kind: UplinkKind,

    /// Number of fragments in the group
    pub fragment_total: u8,

    /// Position of this frame within the group
    pub fragment_index: u8,
}

/// Uplink message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UplinkKind {
    Config,
    NoLocation,
    Wifi,
    Gnss,
    Unknown,
}

impl UplinkKind {
    /// Map a kind selector to a kind; out-of-range values are `Unknown`
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            0 => UplinkKind::Config,
            1 => UplinkKind::NoLocation,
            2 => UplinkKind::Wifi,
            3 => UplinkKind::Gnss,
            _ => UplinkKind::Unknown,
        }
    }
}

/// Storage tag of a decoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UplinkTag {
    Config,
    NoLoc,
    Wifi,
    WifiFragment,
    WifiEnd,
    Gnss,
    GnssFragment,
    GnssEnd,
    Unknown,
}

impl UplinkTag {
    pub fn as_str(self) -> &'static str {
        match self {
            UplinkTag::Config => "CONFIG",
            UplinkTag::NoLoc => "NOLOC",
            UplinkTag::Wifi => "WIFI",
            UplinkTag::WifiFragment => "WIFI_F",
            UplinkTag::WifiEnd => "WIFI_END",
            UplinkTag::Gnss => "GNSS",
            UplinkTag::GnssFragment => "GNSS_F",
            UplinkTag::GnssEnd => "GNSS_END",
            UplinkTag::Unknown => "unknown",
        }
    }

    /// True for tags whose arrival triggers reassembly
    pub fn is_terminal(self) -> bool {
        matches!(self, UplinkTag::WifiEnd | UplinkTag::GnssEnd)
    }
}

impl fmt::Display for UplinkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared sensor block carried by head frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorBlock {
    /// Battery level (0-100%)
    pub battery_pct: u8,

    /// Temperature in degrees Celsius
    pub temperature_c: i8,

    /// Relative humidity (0-100%)
    pub humidity_pct: u8,

    /// Motion detected since last uplink
    pub motion: bool,

    /// Peak acceleration in g, one decimal of precision
    pub max_accel_g: f32,
}

/// 6-byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; MAC_LEN]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// WiFi access point observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WifiBeacon {
    #[serde(rename = "MacAddress")]
    pub mac: MacAddress,

    /// Received signal strength in dBm
    #[serde(rename = "Rss")]
    pub rssi: i8,
}

/// GNSS nav-message fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnssFragment {
    /// Opaque hex slice of the navigation message (empty on head frames)
    pub nav_fragment: String,

    /// Capture time in seconds, head frames only
    pub capture_time_s: Option<u64>,

    /// Declared nav-message size, head frames only
    pub nav_size: Option<u8>,
}

/// Kind-specific payload of a decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum KindPayload {
    None,
    WifiBeacons(Vec<WifiBeacon>),
    GnssFragment(GnssFragment),
}

/// Decoded uplink record
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUplink {
    pub device_id: String,
    pub sequence_number: u64,
    pub timestamp_ms: u64,
    pub uplink_kind: UplinkKind,
    pub tag: UplinkTag,

    /// Fragments in this group, 0 when not applicable
    pub fragment_total: u8,

    /// 0 = head, 1..=6 = continuation, 7 = terminal
    pub fragment_index: u8,

    pub sensor_block: Option<SensorBlock>,
    pub kind_payload: KindPayload,
}

impl DecodedUplink {
    /// Beacons carried by this record (empty for non-WiFi records)
    pub fn beacons(&self) -> &[WifiBeacon] {
        match &self.kind_payload {
            KindPayload::WifiBeacons(beacons) => beacons,
            _ => &[],
        }
    }

    /// GNSS fragment carried by this record
    pub fn gnss(&self) -> Option<&GnssFragment> {
        match &self.kind_payload {
            KindPayload::GnssFragment(fragment) => Some(fragment),
            _ => None,
        }
    }

    /// True for the first fragment of a group
    pub fn is_head(&self) -> bool {
        self.fragment_index == HEAD_FRAGMENT_INDEX && self.sensor_block.is_some()
    }
}

/// Split an acceleration byte into (motion, peak g)
pub fn decode_accel(byte: u8) -> (bool, f32) {
    let motion = byte & MOTION_FLAG != 0;
    let max_accel_g = f32::from(byte & ACCEL_MASK) / 10.0;
    (motion, max_accel_g)
}
