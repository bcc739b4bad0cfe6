//! WebSocket transport and SQLite persistence for the Beachat broker.
//!
//! The engine core is transport-agnostic; this crate supplies its two
//! collaborators: the axum `/ws` endpoint that turns socket events into
//! engine calls, and the sqlx-backed channel store.

pub mod channel_store;
pub mod server;
pub mod ws;

pub use {channel_store::SqliteChannelStore, server::{build_app, open_store, start_gateway}};
