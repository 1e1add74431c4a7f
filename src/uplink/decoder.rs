//! # Uplink Frame Decoder
//!
//! Decodes raw tracker frames into [`DecodedUplink`] records. Pure and
//! stateless: the same bytes always decode to the same record.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Buf;
use tracing::debug;

use super::event::UplinkEvent;
use super::layout::FrameLayout;
use super::protocol::*;
use crate::error::{Result, TrackerError};

/// Identity and ordering keys attached to a decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkMeta {
    pub device_id: String,
    pub sequence_number: u64,
    pub timestamp_ms: u64,
}

/// Frame decoder bound to one header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkDecoder {
    layout: HeaderLayout,
}

impl UplinkDecoder {
    pub fn new(layout: HeaderLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// Decode one frame
    ///
    /// # Arguments
    ///
    /// * `frame` - Frame bytes, header byte first
    /// * `meta` - Identity of the frame as reported by the network
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Decode` if the frame is empty or shorter than
    /// its layout requires. A reserved kind selector is not an error: it
    /// decodes to `UplinkKind::Unknown`.
    pub fn decode(&self, frame: &[u8], meta: UplinkMeta) -> Result<DecodedUplink> {
        let Some(&header_byte) = frame.first() else {
            return Err(TrackerError::Decode("Empty frame".to_string()));
        };

        let header = self.layout.parse(header_byte);
        let layout = FrameLayout::classify(&header);

        if frame.len() < layout.min_len() {
            return Err(TrackerError::Decode(format!(
                "{} frame too short: expected at least {} bytes, got {}",
                layout.tag(),
                layout.min_len(),
                frame.len()
            )));
        }

        debug!(
            "Header 0x{:02X} ({} layout): selector={} total={} index={} -> {}",
            header_byte,
            self.layout,
            header.selector,
            header.fragment_total,
            header.fragment_index,
            layout.tag()
        );

        let mut body = &frame[1..];

        let sensor_block = if layout.carries_sensor_block() {
            Some(read_sensor_block(&mut body))
        } else {
            None
        };

        let kind_payload = match layout {
            FrameLayout::Config | FrameLayout::NoLocation | FrameLayout::Unknown => KindPayload::None,
            FrameLayout::WifiSingle | FrameLayout::WifiHead => {
                let first = read_beacon(&mut body);
                let second = read_beacon(&mut body);
                KindPayload::WifiBeacons(vec![first, second])
            }
            FrameLayout::WifiContinuation | FrameLayout::WifiTerminal => {
                let mut beacons = vec![read_beacon(&mut body)];
                if frame.len() == WIFI_CONTINUATION_PAIR_FRAME_LEN {
                    beacons.push(read_beacon(&mut body));
                }
                KindPayload::WifiBeacons(beacons)
            }
            FrameLayout::GnssHead => {
                let nav_size = body.get_u8();
                let capture_time_s = body.get_uint(CAPTURE_TIME_LEN);
                KindPayload::GnssFragment(GnssFragment {
                    nav_fragment: String::new(),
                    capture_time_s: Some(capture_time_s),
                    nav_size: Some(nav_size),
                })
            }
            FrameLayout::GnssContinuation | FrameLayout::GnssTerminal => {
                KindPayload::GnssFragment(GnssFragment {
                    nav_fragment: hex::encode(body),
                    capture_time_s: None,
                    nav_size: None,
                })
            }
        };

        // Only fragment groups keep the header's index; everything else is a head
        let (fragment_total, fragment_index) = match layout {
            FrameLayout::WifiSingle => (header.fragment_total, HEAD_FRAGMENT_INDEX),
            _ if layout.is_fragmented() => (header.fragment_total, header.fragment_index),
            _ => (0, HEAD_FRAGMENT_INDEX),
        };

        Ok(DecodedUplink {
            device_id: meta.device_id,
            sequence_number: meta.sequence_number,
            timestamp_ms: meta.timestamp_ms,
            uplink_kind: header.kind,
            tag: layout.tag(),
            fragment_total,
            fragment_index,
            sensor_block,
            kind_payload,
        })
    }

    /// Decode a frame given as hex text
    ///
    /// GNSS continuation records keep the text after the header byte as
    /// their nav fragment, character for character.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Decode` for invalid hex and for every error
    /// [`UplinkDecoder::decode`] reports.
    pub fn decode_hex(&self, hex_text: &str, meta: UplinkMeta) -> Result<DecodedUplink> {
        let hex_text = hex_text.trim();
        let frame = hex::decode(hex_text)
            .map_err(|e| TrackerError::Decode(format!("Invalid hex payload: {}", e)))?;

        let mut record = self.decode(&frame, meta)?;
        if let KindPayload::GnssFragment(fragment) = &mut record.kind_payload {
            if fragment.capture_time_s.is_none() {
                fragment.nav_fragment = hex_text.get(2..).unwrap_or_default().to_string();
            }
        }
        Ok(record)
    }

    /// Decode a frame-source event: base64, then hex, then the frame itself
    ///
    /// # Arguments
    ///
    /// * `event` - Event as delivered by the frame source
    /// * `fallback_timestamp_ms` - Receipt time used when the event carries none
    pub fn decode_event(&self, event: &UplinkEvent, fallback_timestamp_ms: u64) -> Result<DecodedUplink> {
        let hex_text = payload_hex(&event.payload_data)?;
        let meta = UplinkMeta {
            device_id: event.device_id.clone(),
            sequence_number: event.metadata.seq,
            timestamp_ms: event.received_at_ms.unwrap_or(fallback_timestamp_ms),
        };
        self.decode_hex(&hex_text, meta)
    }
}

/// Unwrap the frame source's `PayloadData` (base64) into its ASCII hex text
pub fn payload_hex(data: &str) -> Result<String> {
    let ascii = STANDARD
        .decode(data.trim())
        .map_err(|e| TrackerError::Decode(format!("Invalid base64 payload: {}", e)))?;

    let text = String::from_utf8(ascii)
        .map_err(|_| TrackerError::Decode("Payload is not ASCII hex".to_string()))?;

    Ok(text.trim().to_string())
}

/// Decode the frame source's `PayloadData`: base64 of an ASCII hex string
pub fn decode_payload_data(data: &str) -> Result<Vec<u8>> {
    hex::decode(payload_hex(data)?)
        .map_err(|e| TrackerError::Decode(format!("Invalid hex payload: {}", e)))
}

fn read_sensor_block(body: &mut &[u8]) -> SensorBlock {
    let battery_pct = body.get_u8();
    let temperature_c = body.get_i8();
    let humidity_pct = body.get_u8();
    let (motion, max_accel_g) = decode_accel(body.get_u8());

    SensorBlock {
        battery_pct,
        temperature_c,
        humidity_pct,
        motion,
        max_accel_g,
    }
}

fn read_beacon(body: &mut &[u8]) -> WifiBeacon {
    let rssi = body.get_i8();
    let mut mac = [0u8; MAC_LEN];
    body.copy_to_slice(&mut mac);

    WifiBeacon {
        mac: MacAddress(mac),
        rssi,
    }
}
