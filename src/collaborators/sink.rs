//! Publication sinks

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Delivery, PublishSink};
use crate::error::{Result, TrackerError};
use crate::location::{LocationMessage, ResolvedLocation};

/// One published line
#[derive(Debug, Serialize)]
struct PublishedLine<'a> {
    topic: &'a str,
    message: LocationMessage,
}

/// Sink writing one JSON line per publication
pub struct JsonlSink<W> {
    writer: Mutex<W>,
}

impl<W> std::fmt::Debug for JsonlSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink").finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> PublishSink for JsonlSink<W> {
    async fn publish(&self, topic: &str, location: &ResolvedLocation) -> Result<Delivery> {
        let line = PublishedLine {
            topic,
            message: LocationMessage::from(location),
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| TrackerError::Collaborator(format!("Failed to write publication: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| TrackerError::Collaborator(format!("Failed to flush publication: {}", e)))?;

        debug!("Published location for {} to {}", location.device_id, topic);
        Ok(Delivery::Published)
    }
}

/// Recently published (device_id, timestamp_ms) keys, oldest evicted first
#[derive(Debug, Default)]
struct SeenKeys {
    order: VecDeque<(String, u64)>,
    keys: HashSet<(String, u64)>,
}

/// Sink decorator dropping re-publications of the same device and timestamp
///
/// Duplicate terminal-fragment deliveries can each complete a group and
/// resolve it; this keeps only the first publication per key. The key set
/// is bounded to `capacity` entries.
pub struct DedupingSink<P> {
    inner: P,
    capacity: usize,
    seen: Mutex<SeenKeys>,
}

impl<P> std::fmt::Debug for DedupingSink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupingSink")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<P: PublishSink> DedupingSink<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            seen: Mutex::new(SeenKeys::default()),
        }
    }
}

#[async_trait]
impl<P: PublishSink> PublishSink for DedupingSink<P> {
    async fn publish(&self, topic: &str, location: &ResolvedLocation) -> Result<Delivery> {
        let key = (location.device_id.clone(), location.timestamp_ms);

        // Held across the inner publish so concurrent duplicates serialize
        let mut seen = self.seen.lock().await;
        if seen.keys.contains(&key) {
            info!(
                "Suppressed duplicate location for {} at {}",
                location.device_id, location.timestamp_ms
            );
            return Ok(Delivery::Suppressed);
        }

        let delivery = self.inner.publish(topic, location).await?;

        if seen.order.len() >= self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.keys.remove(&oldest);
            }
        }
        seen.keys.insert(key.clone());
        seen.order.push_back(key);

        Ok(delivery)
    }
}
