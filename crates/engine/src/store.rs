use async_trait::async_trait;

use crate::Result;

/// A single persisted channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Unix milliseconds at append time.
    pub created_at: i64,
    /// Message text, verbatim as broadcast.
    pub body: String,
}

/// Durable log of channel definitions and per-channel message history.
///
/// This is the narrow interface the engine requires of the persistence
/// collaborator; the on-disk format behind it is not the engine's concern.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn channel_exists(&self, name: &str) -> Result<bool>;

    /// Create the channel if it does not exist yet. Atomic with respect to
    /// the existence check: two concurrent calls for the same name produce
    /// exactly one channel and both succeed.
    async fn create_channel_if_absent(&self, name: &str) -> Result<()>;

    /// All channel names, sorted lexicographically for display.
    async fn list_channels(&self) -> Result<Vec<String>>;

    /// Append a message to the channel's history log. Returns the monotonic
    /// id that breaks timestamp ties.
    async fn append_message(&self, channel: &str, created_at: i64, body: &str) -> Result<i64>;

    /// The most recent `limit` entries for the channel, ordered oldest to
    /// newest.
    async fn fetch_history(&self, channel: &str, limit: u32) -> Result<Vec<HistoryEntry>>;
}
