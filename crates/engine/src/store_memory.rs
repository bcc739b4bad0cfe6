//! In-memory channel store: the fallback when no database is available, and
//! the store engine tests run against.

use std::{
    collections::BTreeMap,
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    Result,
    store::{ChannelStore, HistoryEntry},
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    created_at: i64,
    body: String,
}

#[derive(Default)]
struct MemoryInner {
    /// Channel name → append-ordered message log. BTreeMap keeps
    /// `list_channels` lexicographic for free.
    channels: BTreeMap<String, Vec<StoredMessage>>,
    next_id: i64,
}

/// `ChannelStore` backed by a mutexed map. No persistence across restarts.
pub struct MemoryChannelStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }
}

impl Default for MemoryChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn channel_exists(&self, name: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.channels.contains_key(name))
    }

    async fn create_channel_if_absent(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.channels.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.channels.keys().cloned().collect())
    }

    async fn append_message(&self, channel: &str, created_at: i64, body: &str) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(StoredMessage {
                id,
                created_at,
                body: body.to_string(),
            });
        Ok(id)
    }

    async fn fetch_history(&self, channel: &str, limit: u32) -> Result<Vec<HistoryEntry>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut messages = inner.channels.get(channel).cloned().unwrap_or_default();
        messages.sort_by_key(|m| (m.created_at, m.id));
        let start = messages.len().saturating_sub(limit as usize);
        Ok(messages[start..]
            .iter()
            .map(|m| HistoryEntry {
                created_at: m.created_at,
                body: m.body.clone(),
            })
            .collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let store = MemoryChannelStore::new();
        store.create_channel_if_absent("#test").await.unwrap();
        store.create_channel_if_absent("#test").await.unwrap();

        assert!(store.channel_exists("#test").await.unwrap());
        assert_eq!(store.list_channels().await.unwrap(), ["#test"]);
    }

    #[tokio::test]
    async fn concurrent_creates_produce_one_channel() {
        let store = Arc::new(MemoryChannelStore::new());
        let (a, b) = tokio::join!(
            store.create_channel_if_absent("#race"),
            store.create_channel_if_absent("#race"),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(store.list_channels().await.unwrap(), ["#race"]);
    }

    #[tokio::test]
    async fn list_is_lexicographic() {
        let store = MemoryChannelStore::new();
        for name in ["#zebra", "#alpha", "#mid"] {
            store.create_channel_if_absent(name).await.unwrap();
        }
        assert_eq!(
            store.list_channels().await.unwrap(),
            ["#alpha", "#mid", "#zebra"]
        );
    }

    #[tokio::test]
    async fn history_returns_most_recent_oldest_first() {
        let store = MemoryChannelStore::new();
        store.create_channel_if_absent("#general").await.unwrap();
        store.append_message("#general", 1, "m1").await.unwrap();
        store.append_message("#general", 2, "m2").await.unwrap();
        store.append_message("#general", 3, "m3").await.unwrap();

        let entries = store.fetch_history("#general", 2).await.unwrap();
        let bodies: Vec<&str> = entries.iter().map(|e| e.body.as_str()).collect();
        assert_eq!(bodies, ["m2", "m3"]);
    }

    #[tokio::test]
    async fn history_breaks_timestamp_ties_by_insertion_order() {
        let store = MemoryChannelStore::new();
        store.append_message("#general", 5, "first").await.unwrap();
        store.append_message("#general", 5, "second").await.unwrap();

        let entries = store.fetch_history("#general", 10).await.unwrap();
        let bodies: Vec<&str> = entries.iter().map(|e| e.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[tokio::test]
    async fn history_of_unknown_channel_is_empty() {
        let store = MemoryChannelStore::new();
        assert!(store.fetch_history("#nope", 5).await.unwrap().is_empty());
    }
}
