//! # Fragment Key and Window Policy
//!
//! Decides which stored records form the group a terminal fragment closes,
//! and whether that group is complete.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::uplink::protocol::{DecodedUplink, UplinkKind};

/// Default trailing window for fragment selection (5 minutes)
pub const DEFAULT_WINDOW_MS: u64 = 300_000;

/// Message kinds that are split into fragment groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindFamily {
    Wifi,
    Gnss,
}

impl KindFamily {
    pub fn of(kind: UplinkKind) -> Option<Self> {
        match kind {
            UplinkKind::Wifi => Some(KindFamily::Wifi),
            UplinkKind::Gnss => Some(KindFamily::Gnss),
            _ => None,
        }
    }
}

/// Identity of the fragment group closed by a terminal fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentKey {
    pub device_id: String,
    pub family: KindFamily,
    pub first_seq: u64,
    pub last_seq: u64,
    pub fragment_total: u8,
}

impl FragmentKey {
    /// Build the key for a terminal fragment
    ///
    /// The group spans `[last_seq - fragment_total + 1, last_seq]`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Decode` if the record is not a WiFi/GNSS
    /// terminal fragment or declares zero fragments.
    pub fn from_terminal(record: &DecodedUplink) -> Result<Self> {
        if !record.tag.is_terminal() {
            return Err(TrackerError::Decode(format!(
                "{} record does not close a fragment group",
                record.tag
            )));
        }

        let family = KindFamily::of(record.uplink_kind).ok_or_else(|| {
            TrackerError::Decode(format!("{:?} uplinks are not fragmented", record.uplink_kind))
        })?;

        if record.fragment_total == 0 {
            return Err(TrackerError::Decode(
                "Terminal fragment declares zero fragments".to_string(),
            ));
        }

        let last_seq = record.sequence_number;
        let first_seq = last_seq.saturating_sub(u64::from(record.fragment_total) - 1);

        Ok(Self {
            device_id: record.device_id.clone(),
            family,
            first_seq,
            last_seq,
            fragment_total: record.fragment_total,
        })
    }
}

/// Range query sent to the fragment store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentQuery {
    pub device_id: String,
    pub first_seq: u64,
    pub last_seq: u64,
    pub min_timestamp_ms: u64,
}

impl FragmentQuery {
    /// True when a stored record falls inside this query
    pub fn matches(&self, record: &DecodedUplink) -> bool {
        record.device_id == self.device_id
            && (self.first_seq..=self.last_seq).contains(&record.sequence_number)
            && record.timestamp_ms >= self.min_timestamp_ms
    }
}

/// Fragments of one complete group, ascending by sequence number
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentGroup {
    pub key: FragmentKey,
    pub fragments: Vec<DecodedUplink>,
}

/// Time-windowed selection of fragment groups
///
/// The time bound keeps stale records with colliding (wrapped or repeated)
/// sequence numbers out of a new group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    window_ms: u64,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl WindowPolicy {
    pub fn new(window_ms: u64) -> Self {
        Self { window_ms }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Store query for a group, bounded to the trailing window ending at `now_ms`
    pub fn query(&self, key: &FragmentKey, now_ms: u64) -> FragmentQuery {
        FragmentQuery {
            device_id: key.device_id.clone(),
            first_seq: key.first_seq,
            last_seq: key.last_seq,
            min_timestamp_ms: now_ms.saturating_sub(self.window_ms),
        }
    }

    /// Assemble the group from the records the store returned
    ///
    /// Records of another kind family are ignored. A sequence number stored
    /// more than once (redelivered fragment) counts once, keeping the most
    /// recently received copy.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::MissingHead` when the group is short and its
    /// head (the record at `first_seq`) is absent, usually because it aged
    /// out of the window. Returns `TrackerError::IncompleteGroup` when the
    /// head is present but the number of distinct fragments still differs
    /// from the declared total.
    pub fn select(&self, key: &FragmentKey, records: Vec<DecodedUplink>) -> Result<FragmentGroup> {
        let mut by_seq: BTreeMap<u64, DecodedUplink> = BTreeMap::new();

        for record in records {
            if KindFamily::of(record.uplink_kind) != Some(key.family)
                || !(key.first_seq..=key.last_seq).contains(&record.sequence_number)
            {
                continue;
            }

            match by_seq.get(&record.sequence_number) {
                Some(existing) if existing.timestamp_ms >= record.timestamp_ms => {}
                _ => {
                    by_seq.insert(record.sequence_number, record);
                }
            }
        }

        let expected = usize::from(key.fragment_total);
        if by_seq.len() != expected {
            if !by_seq.get(&key.first_seq).is_some_and(DecodedUplink::is_head) {
                return Err(TrackerError::MissingHead {
                    device_id: key.device_id.clone(),
                    first_seq: key.first_seq,
                    last_seq: key.last_seq,
                });
            }
            return Err(TrackerError::IncompleteGroup {
                device_id: key.device_id.clone(),
                expected,
                found: by_seq.len(),
            });
        }

        debug!(
            "Selected {} fragments for {} seq {}..={}",
            expected, key.device_id, key.first_seq, key.last_seq
        );

        Ok(FragmentGroup {
            key: key.clone(),
            fragments: by_seq.into_values().collect(),
        })
    }
}
