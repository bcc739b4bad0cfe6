//! Channel fan-out and membership moves.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::{
    Result,
    engine::Engine,
    error::Error,
};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Send `text` verbatim to every session currently bound to `channel`, in
/// registry enumeration order, then optionally append it to the channel's
/// history.
///
/// Delivery is best-effort and isolated per recipient: a closed transport is
/// skipped without affecting the others. Persistence happens after delivery;
/// a store failure is returned to the caller but the broadcast has already
/// gone out, so delivery and durability stay decoupled.
pub async fn broadcast(engine: &Engine, channel: &str, text: &str, persist: bool) -> Result<()> {
    if !engine.store().channel_exists(channel).await? {
        return Err(Error::channel_not_found(channel));
    }

    let recipients: Vec<_> = engine
        .registry()
        .read()
        .await
        .all()
        .into_iter()
        .filter(|s| s.channel == channel)
        .collect();

    debug!(channel, recipients = recipients.len(), "broadcasting");
    for session in &recipients {
        if !session.send(text) {
            // Transport already closing; one final failed attempt is fine.
            debug!(conn_id = %session.conn_id, "skipping send to closed session");
        }
    }

    if persist {
        engine.store().append_message(channel, now_ms(), text).await?;
    }
    Ok(())
}

/// Move a session into `channel`, creating the channel first if needed, and
/// announce the join to the channel's (new) membership. Creation is atomic
/// insert-if-absent at the storage boundary, so two concurrent joins of a
/// fresh channel both succeed against exactly one channel row. Rejoining the
/// current channel is permitted and re-announces.
pub async fn join(engine: &Engine, conn_id: &str, channel: &str) -> Result<()> {
    engine.store().create_channel_if_absent(channel).await?;

    let name = {
        let mut registry = engine.registry().write().await;
        let Some(session) = registry.get_mut(conn_id) else {
            // Disconnected while the join was in flight; nothing to move.
            return Ok(());
        };
        session.channel = channel.to_string();
        session.name.clone()
    };

    info!(conn_id = %conn_id, channel, "session joined channel");
    broadcast(
        engine,
        channel,
        &format!("Server: {name} joined channel '{channel}'."),
        false,
    )
    .await
}
