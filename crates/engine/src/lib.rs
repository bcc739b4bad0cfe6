//! Session/channel/command core of the Beachat broker.
//!
//! Tracks live connections, manages channel membership and broadcast
//! fan-out, routes inbound text through an ordered command table, supervises
//! connection liveness with per-session keepalive timers, and talks to a
//! pluggable [`store::ChannelStore`] for channel definitions and message
//! history. Transport-agnostic: the only handle it holds per connection is
//! an outbound `mpsc` line channel.

pub mod broadcast;
mod commands;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod keepalive;
pub mod registry;
pub mod store;
pub mod store_memory;

pub use {
    commands::CHANNEL_MARKER,
    engine::{Engine, EngineConfig, WELCOME},
    error::{Error, Result},
    registry::{Session, SessionRegistry, SessionView},
    store::{ChannelStore, HistoryEntry},
    store_memory::MemoryChannelStore,
};
