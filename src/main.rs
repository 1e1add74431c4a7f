//! # Tracker Uplink
//!
//! Ingest asset tracker uplinks and publish resolved locations.
//!
//! Reads one invocation JSON per line from stdin, runs it through the
//! decode/reassemble/resolve pipeline, and writes published locations as
//! JSON lines to stdout. Logs go to stderr (and optionally a rolling file).

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use tracker_uplink::collaborators::{
    DedupingSink, GeolocationOracle, InMemoryFragmentStore, JsonlSink, PublishSink, StaticOracle,
    UnavailableOracle,
};
use tracker_uplink::config::{Config, LoggingConfig, OracleMode};
use tracker_uplink::orchestrator::{Orchestrator, Outcome};
use tracker_uplink::uplink::event::InvocationEnvelope;

/// How often expired fragments are dropped from the in-memory store
const PRUNE_INTERVAL_SECS: u64 = 60;

/// Main entry point
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, defaults when absent)
///    - Set up logging with tracing subscriber
///    - Build store, oracle and sink collaborators
///
/// 2. **Main Loop**
///    - Handle each stdin line as one uplink invocation
///    - Every minute, prune fragments older than the reassembly window,
///      measured from the latest event receipt time
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Shutdown**
///    - Log event totals on EOF or Ctrl+C
///
/// # Examples
///
/// ```bash
/// cat uplinks.jsonl | tracker-uplink config/tracker.toml > locations.jsonl
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.logging)?;

    info!("Tracker Uplink v{} starting...", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(InMemoryFragmentStore::new());

    let oracle: Arc<dyn GeolocationOracle> = match config.oracle.mode {
        OracleMode::Static => {
            info!(
                "Using static oracle at ({}, {})",
                config.oracle.latitude, config.oracle.longitude
            );
            Arc::new(StaticOracle::from_config(&config.oracle))
        }
        OracleMode::Unavailable => {
            warn!("No geolocation oracle configured; location requests will fail");
            Arc::new(UnavailableOracle)
        }
    };

    let stdout_sink = JsonlSink::new(tokio::io::stdout());
    let sink: Arc<dyn PublishSink> = if config.publish.dedupe {
        Arc::new(DedupingSink::new(stdout_sink, config.publish.dedupe_capacity))
    } else {
        Arc::new(stdout_sink)
    };

    let orchestrator = Orchestrator::from_config(&config, store.clone(), oracle, sink);
    info!(
        "Decoding with {} header layout, {}ms reassembly window, publishing to {}",
        orchestrator.decoder().layout(),
        config.reassembly.window_ms,
        config.publish.topic
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prune_interval = interval(Duration::from_secs(PRUNE_INTERVAL_SECS));

    let mut stats = Stats::default();
    let mut clock = EventClock::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("End of input");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                stats.record(handle_line(&orchestrator, &mut clock, &line).await);
            }

            _ = prune_interval.tick() => {
                if let Some(cutoff) = clock.prune_cutoff(config.reassembly.window_ms) {
                    let pruned = store.prune_before(cutoff).await;
                    if pruned > 0 {
                        debug!("Pruned {} fragments received before {}", pruned, cutoff);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!(
        "Processed {} events: {} published, {} suppressed, {} stored, {} ignored, {} failed",
        stats.total(),
        stats.published,
        stats.suppressed,
        stats.stored,
        stats.ignored,
        stats.failed
    );

    Ok(())
}

/// Run one invocation line through the pipeline
async fn handle_line(
    orchestrator: &Orchestrator,
    clock: &mut EventClock,
    line: &str,
) -> tracker_uplink::error::Result<Outcome> {
    let event = InvocationEnvelope::parse_uplink(line)?;
    let received_at_ms = now_ms();
    clock.observe(event.received_at_ms.unwrap_or(received_at_ms));
    orchestrator.handle(&event, received_at_ms).await
}

/// Latest event receipt time seen so far
///
/// Store pruning runs on event time, not the wall clock.
#[derive(Debug, Default)]
struct EventClock {
    latest_ms: Option<u64>,
}

impl EventClock {
    fn observe(&mut self, received_at_ms: u64) {
        self.latest_ms = Some(self.latest_ms.map_or(received_at_ms, |latest| latest.max(received_at_ms)));
    }

    /// Records received before this can no longer join any group
    fn prune_cutoff(&self, window_ms: u64) -> Option<u64> {
        self.latest_ms.map(|latest| latest.saturating_sub(window_ms))
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Per-outcome event counters
#[derive(Debug, Default)]
struct Stats {
    published: u64,
    suppressed: u64,
    stored: u64,
    ignored: u64,
    failed: u64,
}

impl Stats {
    fn record(&mut self, result: tracker_uplink::error::Result<Outcome>) {
        match result {
            Ok(Outcome::Published(_)) => self.published += 1,
            Ok(Outcome::Suppressed(_)) => self.suppressed += 1,
            Ok(Outcome::Stored(_)) => self.stored += 1,
            Ok(Outcome::ConfigReceived | Outcome::UnknownKind) => self.ignored += 1,
            Err(e) => {
                warn!("Event failed: {}", e);
                self.failed += 1;
            }
        }
    }

    fn total(&self) -> u64 {
        self.published + self.suppressed + self.stored + self.ignored + self.failed
    }
}

/// Install the tracing subscriber
///
/// Stderr always; a daily rolling file as well when a directory is
/// configured. The returned guard must live until shutdown so buffered file
/// output is flushed.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if config.directory.is_empty() {
        tracing_subscriber::registry().with(filter).with(stderr_layer).init();
        return Ok(None);
    }

    let file_appender = tracing_appender::rolling::daily(&config.directory, "tracker-uplink.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_uplink::error::TrackerError;
    use tracker_uplink::location::ResolvedLocation;
    use tracker_uplink::uplink::protocol::UplinkTag;

    #[test]
    fn test_prune_interval_constant() {
        assert_eq!(PRUNE_INTERVAL_SECS, 60);
    }

    #[test]
    fn test_stats_counts_each_outcome() {
        let location = ResolvedLocation {
            device_id: "t".to_string(),
            timestamp_ms: 1,
            latitude: 0.0,
            longitude: 0.0,
            horizontal_accuracy: 0.0,
            battery_pct: 0,
        };

        let mut stats = Stats::default();
    let mut clock = EventClock::default();
        stats.record(Ok(Outcome::Published(location.clone())));
        stats.record(Ok(Outcome::Suppressed(location)));
        stats.record(Ok(Outcome::Stored(UplinkTag::WifiFragment)));
        stats.record(Ok(Outcome::UnknownKind));
        stats.record(Err(TrackerError::Decode("bad".to_string())));

        assert_eq!(stats.published, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn test_event_clock_starts_empty() {
        assert_eq!(EventClock::default().prune_cutoff(300_000), None);
    }

    #[test]
    fn test_event_clock_follows_latest_event() {
        let mut clock = EventClock::default();
        clock.observe(1_000_000);
        clock.observe(900_000);
        assert_eq!(clock.prune_cutoff(300_000), Some(700_000));

        clock.observe(1_200_000);
        assert_eq!(clock.prune_cutoff(300_000), Some(900_000));
        assert_eq!(clock.prune_cutoff(5_000_000), Some(0));
    }

    #[tokio::test]
    async fn test_replayed_fragments_survive_pruning() {
        use tracker_uplink::collaborators::FragmentStore;
        use tracker_uplink::uplink::decoder::{UplinkDecoder, UplinkMeta};
        use tracker_uplink::uplink::protocol::HeaderLayout;

        // Captured a day ago, replayed now
        let captured_at_ms = now_ms() - 86_400_000;
        let store = InMemoryFragmentStore::new();
        let head = UplinkDecoder::new(HeaderLayout::Primary)
            .decode(
                &[0b11_011_000, 90, 21, 40, 0x05, 0x30, 0x00, 0x00, 0x65, 0x5B, 0xA2, 0x00],
                UplinkMeta {
                    device_id: "tracker-1".to_string(),
                    sequence_number: 1,
                    timestamp_ms: captured_at_ms,
                },
            )
            .unwrap();
        store.upsert(&head).await.unwrap();

        let mut clock = EventClock::default();
        clock.observe(captured_at_ms);
        let cutoff = clock.prune_cutoff(300_000).unwrap();

        assert_eq!(store.prune_before(cutoff).await, 0);
        assert_eq!(store.len().await, 1);

        clock.observe(captured_at_ms + 300_001);
        let cutoff = clock.prune_cutoff(300_000).unwrap();
        assert_eq!(store.prune_before(cutoff).await, 1);
    }

    #[test]
    fn test_now_ms_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
