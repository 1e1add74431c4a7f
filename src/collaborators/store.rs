//! In-process fragment store

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::FragmentStore;
use crate::error::Result;
use crate::fragment::window::FragmentQuery;
use crate::uplink::protocol::DecodedUplink;

/// Fragment store held in memory, keyed by (device_id, timestamp_ms)
#[derive(Debug, Default)]
pub struct InMemoryFragmentStore {
    records: RwLock<BTreeMap<(String, u64), DecodedUplink>>,
}

impl InMemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Drop records received before `min_timestamp_ms`, returning how many went
    pub async fn prune_before(&self, min_timestamp_ms: u64) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.timestamp_ms >= min_timestamp_ms);
        before - records.len()
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn upsert(&self, record: &DecodedUplink) -> Result<()> {
        let key = (record.device_id.clone(), record.timestamp_ms);
        self.records.write().await.insert(key, record.clone());
        debug!(
            "Stored {} seq {} for {}",
            record.tag, record.sequence_number, record.device_id
        );
        Ok(())
    }

    async fn query(&self, query: &FragmentQuery) -> Result<Vec<DecodedUplink>> {
        let records = self.records.read().await;
        let start = (query.device_id.clone(), query.min_timestamp_ms);

        Ok(records
            .range(start..)
            .take_while(|((device_id, _), _)| *device_id == query.device_id)
            .map(|(_, record)| record)
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}
