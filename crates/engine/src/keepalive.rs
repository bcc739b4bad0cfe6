use std::{sync::Arc, time::Duration};

use tracing::trace;

use crate::registry::Session;

/// Callback invoked when a session's keepalive timer fires without being
/// re-armed. Receives the connection id and the epoch the timer was armed
/// with; the engine re-checks the epoch under the registry lock so a stale
/// firing cannot touch a session that refreshed or reconnected in between.
pub type TimeoutFn = Arc<dyn Fn(String, u64) + Send + Sync>;

/// Supervises one timeout timer per session.
///
/// A session with no inbound traffic (including an explicit `/ping`) for the
/// configured interval is forcibly disconnected; this keeps the broadcaster
/// and the store from accumulating unreachable sessions.
pub struct KeepaliveSupervisor {
    interval: Duration,
    on_timeout: TimeoutFn,
}

impl KeepaliveSupervisor {
    pub fn new(interval: Duration, on_timeout: TimeoutFn) -> Self {
        Self {
            interval,
            on_timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// (Re)start the session's timer, cancelling any prior pending timeout.
    /// At most one timeout task per session is pending at any instant.
    ///
    /// Callers hold the registry write lock, which is what sequences an
    /// arm against a concurrently firing timer: the fired callback re-reads
    /// the epoch under the same lock and finds itself stale.
    pub fn arm(&self, session: &mut Session) {
        if let Some(handle) = session.keepalive.take() {
            handle.abort();
        }
        session.keepalive_epoch += 1;

        let conn_id = session.conn_id.clone();
        let epoch = session.keepalive_epoch;
        let interval = self.interval;
        let on_timeout = Arc::clone(&self.on_timeout);
        trace!(conn_id = %conn_id, epoch, "keepalive armed");
        session.keepalive = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            on_timeout(conn_id, epoch);
        }));
    }

    /// Stop the session's timer with no further effect. Safe to call when no
    /// timer is pending.
    pub fn cancel(&self, session: &mut Session) {
        if let Some(handle) = session.keepalive.take() {
            handle.abort();
        }
    }
}
