//! # Frame Layout Table
//!
//! Maps a parsed header to the body layout that follows it. The fragment
//! index means different things per kind (head, continuation, terminal),
//! so every combination resolves to exactly one [`FrameLayout`] here and the
//! decoder never branches on raw header bits again.

use super::protocol::*;

/// Body layout selected by the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Reserved, nothing after the header
    Config,
    /// Sensor block only
    NoLocation,
    /// Self-contained WiFi frame: sensor block + two beacons, resolved at once
    WifiSingle,
    /// First fragment of a WiFi group: sensor block + two beacons
    WifiHead,
    /// Middle WiFi fragment: one or two beacons
    WifiContinuation,
    /// Last WiFi fragment: one or two beacons, triggers reassembly
    WifiTerminal,
    /// First fragment of a GNSS group: sensor block + nav size + capture time
    GnssHead,
    /// Middle GNSS fragment: opaque nav-message slice
    GnssContinuation,
    /// Last GNSS fragment: opaque nav-message slice, triggers reassembly
    GnssTerminal,
    /// Reserved kind selector, reported but not decoded further
    Unknown,
}

impl FrameLayout {
    /// Select the layout for a header
    pub fn classify(header: &FrameHeader) -> Self {
        match (header.kind, header.fragment_total, header.fragment_index) {
            (UplinkKind::Config, _, _) => FrameLayout::Config,
            (UplinkKind::NoLocation, _, _) => FrameLayout::NoLocation,
            (UplinkKind::Wifi, 1, _) => FrameLayout::WifiSingle,
            (UplinkKind::Wifi, _, HEAD_FRAGMENT_INDEX) => FrameLayout::WifiHead,
            (UplinkKind::Wifi, _, TERMINAL_FRAGMENT_INDEX) => FrameLayout::WifiTerminal,
            (UplinkKind::Wifi, _, _) => FrameLayout::WifiContinuation,
            (UplinkKind::Gnss, _, HEAD_FRAGMENT_INDEX) => FrameLayout::GnssHead,
            (UplinkKind::Gnss, _, TERMINAL_FRAGMENT_INDEX) => FrameLayout::GnssTerminal,
            (UplinkKind::Gnss, _, _) => FrameLayout::GnssContinuation,
            (UplinkKind::Unknown, _, _) => FrameLayout::Unknown,
        }
    }

    /// Storage tag for records of this layout
    pub fn tag(self) -> UplinkTag {
        match self {
            FrameLayout::Config => UplinkTag::Config,
            FrameLayout::NoLocation => UplinkTag::NoLoc,
            FrameLayout::WifiSingle => UplinkTag::Wifi,
            FrameLayout::WifiHead | FrameLayout::WifiContinuation => UplinkTag::WifiFragment,
            FrameLayout::WifiTerminal => UplinkTag::WifiEnd,
            FrameLayout::GnssHead => UplinkTag::Gnss,
            FrameLayout::GnssContinuation => UplinkTag::GnssFragment,
            FrameLayout::GnssTerminal => UplinkTag::GnssEnd,
            FrameLayout::Unknown => UplinkTag::Unknown,
        }
    }

    /// Minimum frame length in bytes, header included
    pub fn min_len(self) -> usize {
        match self {
            FrameLayout::Config | FrameLayout::Unknown => 1,
            FrameLayout::NoLocation => NOLOC_FRAME_LEN,
            FrameLayout::WifiSingle | FrameLayout::WifiHead => WIFI_HEAD_FRAME_LEN,
            FrameLayout::WifiContinuation | FrameLayout::WifiTerminal => WIFI_CONTINUATION_FRAME_LEN,
            FrameLayout::GnssHead => GNSS_HEAD_FRAME_LEN,
            FrameLayout::GnssContinuation | FrameLayout::GnssTerminal => GNSS_CONTINUATION_FRAME_LEN,
        }
    }

    /// True when the body starts with the shared sensor block
    pub fn carries_sensor_block(self) -> bool {
        matches!(
            self,
            FrameLayout::NoLocation
                | FrameLayout::WifiSingle
                | FrameLayout::WifiHead
                | FrameLayout::GnssHead
        )
    }

    /// True when the header's fragment fields are meaningful for this layout
    pub fn is_fragmented(self) -> bool {
        !matches!(
            self,
            FrameLayout::Config | FrameLayout::NoLocation | FrameLayout::Unknown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(byte: u8) -> FrameLayout {
        FrameLayout::classify(&HeaderLayout::Primary.parse(byte))
    }

    #[test]
    fn test_wifi_layouts() {
        assert_eq!(classify(0b10_001_000), FrameLayout::WifiSingle);
        // Single-shot wins regardless of the index bits
        assert_eq!(classify(0b10_001_111), FrameLayout::WifiSingle);
        assert_eq!(classify(0b10_011_000), FrameLayout::WifiHead);
        assert_eq!(classify(0b10_011_001), FrameLayout::WifiContinuation);
        assert_eq!(classify(0b10_011_110), FrameLayout::WifiContinuation);
        assert_eq!(classify(0b10_011_111), FrameLayout::WifiTerminal);
    }

    #[test]
    fn test_gnss_layouts() {
        assert_eq!(classify(0b11_100_000), FrameLayout::GnssHead);
        assert_eq!(classify(0b11_100_010), FrameLayout::GnssContinuation);
        assert_eq!(classify(0b11_100_111), FrameLayout::GnssTerminal);
    }

    #[test]
    fn test_tags() {
        assert_eq!(FrameLayout::WifiHead.tag(), UplinkTag::WifiFragment);
        assert_eq!(FrameLayout::WifiContinuation.tag(), UplinkTag::WifiFragment);
        assert_eq!(FrameLayout::WifiTerminal.tag(), UplinkTag::WifiEnd);
        assert_eq!(FrameLayout::GnssHead.tag(), UplinkTag::Gnss);
        assert_eq!(FrameLayout::GnssTerminal.tag(), UplinkTag::GnssEnd);
    }

    #[test]
    fn test_min_lengths() {
        assert_eq!(FrameLayout::NoLocation.min_len(), 5);
        assert_eq!(FrameLayout::WifiHead.min_len(), 19);
        assert_eq!(FrameLayout::WifiTerminal.min_len(), 8);
        assert_eq!(FrameLayout::GnssHead.min_len(), 12);
        assert_eq!(FrameLayout::GnssContinuation.min_len(), 2);
        assert_eq!(FrameLayout::Config.min_len(), 1);
    }

    #[test]
    fn test_sensor_block_only_on_heads() {
        assert!(FrameLayout::WifiHead.carries_sensor_block());
        assert!(FrameLayout::GnssHead.carries_sensor_block());
        assert!(!FrameLayout::WifiContinuation.carries_sensor_block());
        assert!(!FrameLayout::WifiTerminal.carries_sensor_block());
        assert!(!FrameLayout::GnssContinuation.carries_sensor_block());
        assert!(!FrameLayout::GnssTerminal.carries_sensor_block());
    }
}
