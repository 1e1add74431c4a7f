//! # Uplink Orchestrator
//!
//! Runs one incoming event through the pipeline:
//!
//! ```text
//! decode ─┬─ CONFIG / unknown ───────────────────────────► report
//!         ├─ NOLOC, WIFI_F, GNSS, GNSS_F ─► store ────────► wait
//!         ├─ WIFI (single) ─► store ─► resolve ─► normalize ─► publish
//!         └─ WIFI_END / GNSS_END ─► store ─► window query ─► reassemble
//!                                     ─► resolve ─► normalize ─► publish
//! ```
//!
//! The orchestrator holds no state between events; group state lives in the
//! fragment store. The query/check/resolve sequence is not atomic, so a
//! redelivered terminal fragment can resolve a group twice. Whether that
//! reaches consumers twice is up to the sink (see `DedupingSink`).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collaborators::{Delivery, FragmentStore, GeolocationOracle, PublishSink};
use crate::config::Config;
use crate::error::{Result, TrackerError};
use crate::fragment::reassembler::{reassemble, Reassembled};
use crate::fragment::window::{FragmentKey, WindowPolicy};
use crate::location::{normalize, LocationContext, OracleResponse, ResolvedLocation};
use crate::uplink::decoder::UplinkDecoder;
use crate::uplink::event::UplinkEvent;
use crate::uplink::protocol::{DecodedUplink, UplinkTag};

/// What happened to one event
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Config uplink; nothing to do yet
    ConfigReceived,
    /// Reserved kind selector; reported, not resolved
    UnknownKind,
    /// Record persisted, waiting for the rest of its group
    Stored(UplinkTag),
    /// Location resolved and published
    Published(ResolvedLocation),
    /// Location resolved but already published for this device and timestamp
    Suppressed(ResolvedLocation),
}

/// Per-event pipeline over injected collaborators
pub struct Orchestrator {
    decoder: UplinkDecoder,
    policy: WindowPolicy,
    topic: String,
    store: Arc<dyn FragmentStore>,
    oracle: Arc<dyn GeolocationOracle>,
    sink: Arc<dyn PublishSink>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("decoder", &self.decoder)
            .field("policy", &self.policy)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        decoder: UplinkDecoder,
        policy: WindowPolicy,
        topic: impl Into<String>,
        store: Arc<dyn FragmentStore>,
        oracle: Arc<dyn GeolocationOracle>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self {
            decoder,
            policy,
            topic: topic.into(),
            store,
            oracle,
            sink,
        }
    }

    /// Build from configuration with the given collaborators
    pub fn from_config(
        config: &Config,
        store: Arc<dyn FragmentStore>,
        oracle: Arc<dyn GeolocationOracle>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self::new(
            UplinkDecoder::new(config.decoder.header_layout),
            WindowPolicy::new(config.reassembly.window_ms),
            config.publish.topic.clone(),
            store,
            oracle,
            sink,
        )
    }

    pub fn decoder(&self) -> &UplinkDecoder {
        &self.decoder
    }

    /// Handle one frame-source event
    ///
    /// # Arguments
    ///
    /// * `event` - Event as delivered by the frame source
    /// * `received_at_ms` - Receipt time, used when the event carries none
    ///
    /// # Errors
    ///
    /// Decode, incomplete-group and missing-head errors end processing of the
    /// event. Store, oracle and sink failures are returned unchanged; nothing
    /// is retried here.
    pub async fn handle(&self, event: &UplinkEvent, received_at_ms: u64) -> Result<Outcome> {
        let record = self.decoder.decode_event(event, received_at_ms)?;
        self.handle_record(record).await
    }

    /// Handle an already decoded record
    pub async fn handle_record(&self, record: DecodedUplink) -> Result<Outcome> {
        info!(
            "Uplink {} from {} seq {} (fragment {}/{})",
            record.tag, record.device_id, record.sequence_number, record.fragment_index, record.fragment_total
        );

        match record.tag {
            UplinkTag::Config => {
                info!("Config uplink from {}: no action", record.device_id);
                Ok(Outcome::ConfigReceived)
            }
            UplinkTag::Unknown => {
                warn!("Unknown uplink message type from {}", record.device_id);
                Ok(Outcome::UnknownKind)
            }
            UplinkTag::NoLoc | UplinkTag::WifiFragment | UplinkTag::Gnss | UplinkTag::GnssFragment => {
                self.store.upsert(&record).await?;
                Ok(Outcome::Stored(record.tag))
            }
            UplinkTag::Wifi => {
                self.store.upsert(&record).await?;
                let request = single_shot_request(&record)?;
                self.resolve_and_publish(request).await
            }
            UplinkTag::WifiEnd | UplinkTag::GnssEnd => {
                self.store.upsert(&record).await?;
                let request = self.collect_group(&record).await?;
                self.resolve_and_publish(request).await
            }
        }
    }

    /// Fetch and reassemble the group a terminal fragment closes
    async fn collect_group(&self, terminal: &DecodedUplink) -> Result<Reassembled> {
        let key = FragmentKey::from_terminal(terminal)?;
        let query = self.policy.query(&key, terminal.timestamp_ms);

        debug!(
            "Querying {} seq {}..={} since {}",
            query.device_id, query.first_seq, query.last_seq, query.min_timestamp_ms
        );

        let records = self.store.query(&query).await?;
        let group = self.policy.select(&key, records)?;
        reassemble(&group)
    }

    async fn resolve_and_publish(&self, request: Reassembled) -> Result<Outcome> {
        let origin = request.origin();

        let answer = match &request {
            Reassembled::WifiBeaconSet { beacons, timestamp_ms, .. } => {
                info!("Resolving {} WiFi beacons for {}", beacons.len(), request.device_id());
                self.oracle.resolve_wifi(beacons, *timestamp_ms).await?
            }
            Reassembled::GnssMessage { nav_message, capture_time_s, .. } => {
                info!(
                    "Resolving GNSS nav message ({} hex chars) for {}",
                    nav_message.len(),
                    request.device_id()
                );
                self.oracle.resolve_gnss(nav_message, *capture_time_s).await?
            }
        };

        let response = OracleResponse::from_geojson(&answer, origin)?;
        let location = normalize(
            &response,
            origin,
            LocationContext {
                device_id: request.device_id().to_string(),
                timestamp_ms: request.timestamp_ms(),
                battery_pct: request.battery_pct(),
            },
        );

        info!(
            "Location for {}: lat {} lon {} (±{}m)",
            location.device_id, location.latitude, location.longitude, location.horizontal_accuracy
        );

        match self.sink.publish(&self.topic, &location).await? {
            Delivery::Published => Ok(Outcome::Published(location)),
            Delivery::Suppressed => Ok(Outcome::Suppressed(location)),
        }
    }
}

/// Resolution request for a self-contained WiFi frame
fn single_shot_request(record: &DecodedUplink) -> Result<Reassembled> {
    let sensors = record.sensor_block.ok_or_else(|| {
        TrackerError::Decode(format!("{} record without sensor block", record.tag))
    })?;

    Ok(Reassembled::WifiBeaconSet {
        device_id: record.device_id.clone(),
        beacons: record.beacons().to_vec(),
        timestamp_ms: record.timestamp_ms,
        battery_pct: sensors.battery_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        InMemoryFragmentStore, MockFragmentStore, MockGeolocationOracle, MockPublishSink,
    };
    use crate::uplink::decoder::UplinkMeta;
    use crate::uplink::protocol::HeaderLayout;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const DEVICE: &str = "tracker-1";
    const MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    fn wifi_answer() -> serde_json::Value {
        json!({ "coordinates": [-71.1, 42.3], "properties": { "horizontalAccuracy": 20.0 } })
    }

    fn gnss_answer() -> serde_json::Value {
        json!({ "location": { "coordinates": [42.3, -71.1], "properties": { "horizontalAccuracy": 3.0 } } })
    }

    fn publishing_sink(times: usize) -> MockPublishSink {
        let mut sink = MockPublishSink::new();
        sink.expect_publish().times(times).returning(|_, _| Ok(Delivery::Published));
        sink
    }

    fn orchestrator(
        store: Arc<dyn FragmentStore>,
        oracle: MockGeolocationOracle,
        sink: MockPublishSink,
    ) -> Orchestrator {
        Orchestrator::new(
            UplinkDecoder::new(HeaderLayout::Primary),
            WindowPolicy::default(),
            "iot/assettracker",
            store,
            Arc::new(oracle),
            Arc::new(sink),
        )
    }

    fn decode(frame: &[u8], seq: u64, timestamp_ms: u64) -> DecodedUplink {
        UplinkDecoder::new(HeaderLayout::Primary)
            .decode(
                frame,
                UplinkMeta {
                    device_id: DEVICE.to_string(),
                    sequence_number: seq,
                    timestamp_ms,
                },
            )
            .unwrap()
    }

    fn wifi_head(header: u8) -> Vec<u8> {
        let mut frame = vec![header, 91, 20, 45, 0x00, 0xBA];
        frame.extend_from_slice(&MAC);
        frame.push(0xC4);
        frame.extend_from_slice(&MAC);
        frame
    }

    fn wifi_tail(header: u8) -> Vec<u8> {
        let mut frame = vec![header, 0xB0];
        frame.extend_from_slice(&MAC);
        frame
    }

    #[tokio::test]
    async fn test_config_and_unknown_not_stored() {
        let mut store = MockFragmentStore::new();
        store.expect_upsert().never();
        let mut oracle = MockGeolocationOracle::new();
        oracle.expect_resolve_wifi().never();
        let orch = orchestrator(Arc::new(store), oracle, publishing_sink(0));

        let outcome = orch.handle_record(decode(&[0x00], 1, 10)).await.unwrap();
        assert_eq!(outcome, Outcome::ConfigReceived);

        let legacy = UplinkDecoder::new(HeaderLayout::Legacy)
            .decode(
                &[0xA0],
                UplinkMeta {
                    device_id: DEVICE.to_string(),
                    sequence_number: 2,
                    timestamp_ms: 20,
                },
            )
            .unwrap();
        let outcome = orch.handle_record(legacy).await.unwrap();
        assert_eq!(outcome, Outcome::UnknownKind);
    }

    #[tokio::test]
    async fn test_noloc_stored() {
        let store = Arc::new(InMemoryFragmentStore::new());
        let orch = orchestrator(store.clone(), MockGeolocationOracle::new(), publishing_sink(0));

        let outcome = orch.handle_record(decode(&[0x40, 90, 20, 40, 0x00], 1, 10)).await.unwrap();
        assert_eq!(outcome, Outcome::Stored(UplinkTag::NoLoc));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_single_wifi_resolved_immediately() {
        let store = Arc::new(InMemoryFragmentStore::new());
        let mut oracle = MockGeolocationOracle::new();
        oracle
            .expect_resolve_wifi()
            .withf(|beacons, timestamp_ms| beacons.len() == 2 && *timestamp_ms == 1_000)
            .times(1)
            .returning(|_, _| Ok(wifi_answer()));
        let orch = orchestrator(store.clone(), oracle, publishing_sink(1));

        let outcome = orch.handle_record(decode(&wifi_head(0b10_001_000), 5, 1_000)).await.unwrap();
        match outcome {
            Outcome::Published(location) => {
                assert_eq!(location.latitude, 42.3);
                assert_eq!(location.longitude, -71.1);
                assert_eq!(location.battery_pct, 91);
                assert_eq!(location.timestamp_ms, 1_000);
            }
            other => panic!("Expected Published, got: {:?}", other),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_wifi_group_reassembled_on_terminal() {
        let store = Arc::new(InMemoryFragmentStore::new());
        let mut oracle = MockGeolocationOracle::new();
        oracle
            .expect_resolve_wifi()
            .withf(|beacons, timestamp_ms| beacons.len() == 4 && *timestamp_ms == 1_000)
            .times(1)
            .returning(|_, _| Ok(wifi_answer()));
        let orch = orchestrator(store, oracle, publishing_sink(1));

        let head = orch.handle_record(decode(&wifi_head(0b10_011_000), 100, 1_000)).await;
        assert_eq!(assert_ok!(head), Outcome::Stored(UplinkTag::WifiFragment));
        let middle = orch.handle_record(decode(&wifi_tail(0b10_011_001), 101, 2_000)).await;
        assert_eq!(assert_ok!(middle), Outcome::Stored(UplinkTag::WifiFragment));

        let outcome = orch.handle_record(decode(&wifi_tail(0b10_011_111), 102, 3_000)).await.unwrap();
        assert!(matches!(outcome, Outcome::Published(ref l) if l.timestamp_ms == 1_000));
    }

    #[tokio::test]
    async fn test_incomplete_group_not_resolved() {
        let store = Arc::new(InMemoryFragmentStore::new());
        let mut oracle = MockGeolocationOracle::new();
        oracle.expect_resolve_wifi().never();
        let orch = orchestrator(store, oracle, publishing_sink(0));

        assert_ok!(orch.handle_record(decode(&wifi_head(0b10_011_000), 100, 1_000)).await);
        let result = orch.handle_record(decode(&wifi_tail(0b10_011_111), 102, 3_000)).await;

        match assert_err!(result) {
            TrackerError::IncompleteGroup { expected, found, .. } => {
                assert_eq!((expected, found), (3, 2));
            }
            other => panic!("Expected IncompleteGroup, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_head_is_missing_head() {
        let store = Arc::new(InMemoryFragmentStore::new());
        let mut oracle = MockGeolocationOracle::new();
        oracle.expect_resolve_wifi().never();
        let orch = orchestrator(store, oracle, publishing_sink(0));

        // Head arrives more than five minutes before the rest of the group
        assert_ok!(orch.handle_record(decode(&wifi_head(0b10_011_000), 100, 0)).await);
        assert_ok!(orch.handle_record(decode(&wifi_tail(0b10_011_001), 101, 400_000)).await);
        let result = orch.handle_record(decode(&wifi_tail(0b10_011_111), 102, 400_100)).await;

        match assert_err!(result) {
            TrackerError::MissingHead { first_seq, last_seq, .. } => {
                assert_eq!((first_seq, last_seq), (100, 102));
            }
            other => panic!("Expected MissingHead, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gnss_group_reassembled_out_of_order() {
        let store = Arc::new(InMemoryFragmentStore::new());
        let mut oracle = MockGeolocationOracle::new();
        oracle
            .expect_resolve_gnss()
            .withf(|nav, capture| nav.to_string() == "abcdef" && *capture == 0x0102_0304)
            .times(1)
            .returning(|_, _| Ok(gnss_answer()));
        let orch = orchestrator(store, oracle, publishing_sink(1));

        let head = [0b11_100_000, 70, 10, 30, 0x00, 3, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04];
        // Middle fragments stored before the head
        assert_ok!(orch.handle_record(decode(&[0b11_100_010, 0xCD], 12, 1_200)).await);
        assert_ok!(orch.handle_record(decode(&[0b11_100_001, 0xAB], 11, 1_100)).await);
        assert_ok!(orch.handle_record(decode(&head, 10, 1_000)).await);

        let outcome = orch.handle_record(decode(&[0b11_100_111, 0xEF], 13, 1_300)).await.unwrap();
        match outcome {
            Outcome::Published(location) => {
                assert_eq!(location.latitude, 42.3);
                assert_eq!(location.longitude, -71.1);
                assert_eq!(location.battery_pct, 70);
                assert_eq!(location.timestamp_ms, 1_000);
            }
            other => panic!("Expected Published, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oracle_failure_surfaces() {
        let mut oracle = MockGeolocationOracle::new();
        oracle
            .expect_resolve_wifi()
            .returning(|_, _| Err(TrackerError::Resolution("ambiguous beacons".to_string())));
        let orch = orchestrator(Arc::new(InMemoryFragmentStore::new()), oracle, publishing_sink(0));

        let result = orch.handle_record(decode(&wifi_head(0b10_001_000), 5, 1_000)).await;
        assert!(matches!(result, Err(TrackerError::Resolution(_))));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let mut store = MockFragmentStore::new();
        store
            .expect_upsert()
            .returning(|_| Err(TrackerError::Collaborator("table unavailable".to_string())));
        let orch = orchestrator(Arc::new(store), MockGeolocationOracle::new(), publishing_sink(0));

        let result = orch.handle_record(decode(&[0x40, 90, 20, 40, 0x00], 1, 10)).await;
        assert!(matches!(result, Err(TrackerError::Collaborator(_))));
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_resolution_error() {
        let mut oracle = MockGeolocationOracle::new();
        oracle.expect_resolve_wifi().returning(|_, _| Ok(json!({ "message": "no fix" })));
        let orch = orchestrator(Arc::new(InMemoryFragmentStore::new()), oracle, publishing_sink(0));

        let result = orch.handle_record(decode(&wifi_head(0b10_001_000), 5, 1_000)).await;
        assert!(matches!(result, Err(TrackerError::Resolution(_))));
    }

    #[tokio::test]
    async fn test_suppressed_delivery_reported() {
        let mut oracle = MockGeolocationOracle::new();
        oracle.expect_resolve_wifi().returning(|_, _| Ok(wifi_answer()));
        let mut sink = MockPublishSink::new();
        sink.expect_publish().returning(|_, _| Ok(Delivery::Suppressed));
        let orch = orchestrator(Arc::new(InMemoryFragmentStore::new()), oracle, sink);

        let outcome = orch.handle_record(decode(&wifi_head(0b10_001_000), 5, 1_000)).await.unwrap();
        assert!(matches!(outcome, Outcome::Suppressed(_)));
    }

    #[tokio::test]
    async fn test_handle_event_decodes_payload() {
        let orch = orchestrator(
            Arc::new(InMemoryFragmentStore::new()),
            MockGeolocationOracle::new(),
            publishing_sink(0),
        );
        let event = UplinkEvent {
            device_id: DEVICE.to_string(),
            // base64("4057ec558a")
            payload_data: "NDA1N2VjNTU4YQ==".to_string(),
            metadata: crate::uplink::event::WirelessMetadata { seq: 9 },
            received_at_ms: None,
        };

        let outcome = orch.handle(&event, 42).await.unwrap();
        assert_eq!(outcome, Outcome::Stored(UplinkTag::NoLoc));

        let bad = UplinkEvent {
            payload_data: "%%%".to_string(),
            ..event
        };
        assert!(matches!(orch.handle(&bad, 42).await, Err(TrackerError::Decode(_))));
    }
}
