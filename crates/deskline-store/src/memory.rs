//! In-memory record source with the same matching rule as the SQLite store.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::RecordSource;
use crate::types::{keys_match, name_key, Record};

/// Fixed set of records, optionally slow or unavailable.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    records: Vec<Record>,
    latency: Option<Duration>,
    available: bool,
}

impl MemoryDirectory {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            latency: None,
            available: true,
        }
    }

    /// A directory whose backing store is down: every call fails closed.
    pub fn unavailable() -> Self {
        Self {
            records: Vec::new(),
            latency: None,
            available: false,
        }
    }

    /// Delay every call by `latency` (simulates a slow store).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RecordSource for MemoryDirectory {
    async fn find_by_approximate_name(&self, name: &str) -> Option<Record> {
        self.wait().await;
        if !self.available {
            return None;
        }
        let key = name_key(name);
        self.records
            .iter()
            .find(|r| keys_match(&name_key(&r.canonical_name), &key))
            .cloned()
    }

    async fn list_all_names(&self) -> Vec<String> {
        self.wait().await;
        if !self.available {
            return Vec::new();
        }
        self.records.iter().map(|r| r.canonical_name.clone()).collect()
    }
}
