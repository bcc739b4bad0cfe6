use std::{sync::Arc, time::Duration};

use {
    tokio::sync::{RwLock, mpsc},
    tracing::{info, warn},
};

use crate::{
    Result,
    broadcast,
    commands,
    dispatch::CommandTable,
    error::Error,
    keepalive::{KeepaliveSupervisor, TimeoutFn},
    registry::{Session, SessionRegistry, SessionView},
    store::ChannelStore,
};

/// Greeting sent to every session before it is announced to the default
/// channel.
pub const WELCOME: &str = "Server: Welcome to the Beachat server! Type '/help' for instructions and a list of commands you can use.";

// ── Engine configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Channel every session is joined to on connect. Exists for the
    /// lifetime of the process.
    pub default_channel: String,
    /// How long a session may stay silent before it is disconnected.
    pub keepalive_interval: Duration,
    /// `/history` entry count when the command gives no explicit limit.
    pub history_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_channel: "#general".into(),
            keepalive_interval: Duration::from_secs(60),
            history_limit: 20,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Composition root of the broker core: wires the session registry, the
/// keepalive supervisor, the channel store, and the command table into the
/// operations the transport layer calls on connect/message/disconnect.
///
/// The registry is guarded as a whole by one `RwLock`; handlers for
/// different sessions run concurrently and all go through it.
pub struct Engine {
    registry: RwLock<SessionRegistry>,
    store: Arc<dyn ChannelStore>,
    keepalive: KeepaliveSupervisor,
    commands: CommandTable,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn ChannelStore>, config: EngineConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Engine>| {
            let weak = weak.clone();
            let on_timeout: TimeoutFn = Arc::new(move |conn_id, epoch| {
                // The timer task must not do lock-holding work itself; hand
                // the removal to a fresh task on the engine.
                if let Some(engine) = weak.upgrade() {
                    tokio::spawn(async move {
                        engine.keepalive_timeout(&conn_id, epoch).await;
                    });
                }
            });
            Self {
                registry: RwLock::new(SessionRegistry::new()),
                store,
                keepalive: KeepaliveSupervisor::new(config.keepalive_interval, on_timeout),
                commands: commands::builtin_table(),
                config,
            }
        })
    }

    pub(crate) fn registry(&self) -> &RwLock<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ChannelStore> {
        &self.store
    }

    pub fn default_channel(&self) -> &str {
        &self.config.default_channel
    }

    pub fn history_limit(&self) -> u32 {
        self.config.history_limit
    }

    // ── Transport-facing operations ──────────────────────────────────────

    /// Register a new connection under `name` and join it to the default
    /// channel, creating that channel if this is the first connection ever.
    pub async fn on_connect(
        self: &Arc<Self>,
        name: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<SessionView> {
        self.store
            .create_channel_if_absent(&self.config.default_channel)
            .await?;

        let conn_id = uuid::Uuid::new_v4().to_string();
        let mut session = Session::new(&conn_id, name, &self.config.default_channel, sender);
        if !session.send(WELCOME) {
            return Err(Error::transport("connection closed during connect"));
        }

        let view = session.view();
        {
            let mut registry = self.registry.write().await;
            self.keepalive.arm(&mut session);
            registry.register(session)?;
        }
        info!(conn_id = %conn_id, name = %name, "session connected");

        broadcast::join(self, &conn_id, &self.config.default_channel).await?;
        Ok(view)
    }

    /// Route one inbound text line from a connection. Any inbound traffic
    /// counts as liveness, so the keepalive timer is re-armed first. Lines
    /// from a session that has already been removed are dropped.
    pub async fn on_message(self: &Arc<Self>, conn_id: &str, text: &str) {
        let view = {
            let mut registry = self.registry.write().await;
            match registry.get_mut(conn_id) {
                Some(session) => {
                    self.keepalive.arm(session);
                    session.view()
                },
                None => return,
            }
        };
        self.commands.dispatch(text, view, Arc::clone(self)).await;
    }

    /// Remove a session. Idempotent; the registry removal cancels the
    /// keepalive timer in the same step. No departure broadcast.
    pub async fn on_disconnect(&self, conn_id: &str) {
        let removed = self.registry.write().await.remove(conn_id);
        if let Some(session) = removed {
            info!(conn_id = %conn_id, name = %session.name, "session disconnected");
        }
    }

    /// Re-arm the session's keepalive timer. Dispatched by the `/ping`
    /// command rather than a separate transport event.
    pub async fn on_keepalive_refresh(&self, conn_id: &str) {
        let mut registry = self.registry.write().await;
        if let Some(session) = registry.get_mut(conn_id) {
            self.keepalive.arm(session);
        }
    }

    // ── Registry-facing helpers used by command handlers ─────────────────

    /// First connected session with this exact display name.
    pub async fn lookup_session(&self, name: &str) -> Result<SessionView> {
        self.registry.read().await.lookup(name)
    }

    /// Snapshot of all connected sessions in enumeration order.
    pub async fn sessions(&self) -> Vec<SessionView> {
        self.registry.read().await.all()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Change a session's display name. Collisions with other live names are
    /// permitted (documented limitation).
    pub async fn rename(&self, conn_id: &str, new_name: &str) -> bool {
        self.registry.write().await.rename(conn_id, new_name)
    }

    // ── Keepalive timeout path ───────────────────────────────────────────

    /// Called by the supervisor when a timer fires. The epoch re-check under
    /// the write lock sequences the firing against a concurrent refresh: a
    /// session that re-armed in the meantime carries a newer epoch and is
    /// left alone, and a session already removed is not resurrected.
    pub(crate) async fn keepalive_timeout(&self, conn_id: &str, epoch: u64) {
        let removed = {
            let mut registry = self.registry.write().await;
            let expired = registry
                .get(conn_id)
                .is_some_and(|s| s.keepalive_epoch == epoch);
            if expired { registry.remove(conn_id) } else { None }
        };
        if let Some(session) = removed {
            warn!(conn_id = %conn_id, name = %session.name, "keepalive expired, disconnecting");
            session.send("Server: disconnected: keepalive timeout.");
            // Dropping the session drops the engine's sender; the transport
            // write loop drains any queued lines and closes the socket.
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::store_memory::MemoryChannelStore;

    fn test_engine(interval: Duration) -> Arc<Engine> {
        Engine::new(Arc::new(MemoryChannelStore::new()), EngineConfig {
            keepalive_interval: interval,
            ..EngineConfig::default()
        })
    }

    async fn connect(engine: &Arc<Engine>, name: &str) -> (SessionView, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let view = engine.on_connect(name, tx).await.unwrap();
        (view, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Let spawned timer/disconnect tasks run to completion.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn connect_creates_default_channel_and_welcomes() {
        let engine = test_engine(Duration::from_secs(60));
        let (_alice, mut rx) = connect(&engine, "alice").await;

        assert!(engine.store().channel_exists("#general").await.unwrap());
        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Welcome to the Beachat server"));
        assert_eq!(lines[1], "Server: alice joined channel '#general'.");
    }

    #[tokio::test]
    async fn plain_text_broadcasts_to_channel_and_persists() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        let (_bob, mut bob_rx) = connect(&engine, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        engine.on_message(&alice.conn_id, "hello").await;

        assert_eq!(drain(&mut alice_rx), ["alice: hello"]);
        assert_eq!(drain(&mut bob_rx), ["alice: hello"]);

        let history = engine.store().fetch_history("#general", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "alice: hello");
    }

    #[tokio::test]
    async fn broadcast_is_scoped_to_the_channel() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        let (bob, mut bob_rx) = connect(&engine, "bob").await;
        engine.on_message(&bob.conn_id, "/join #dev").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        engine.on_message(&alice.conn_id, "only general").await;

        assert_eq!(drain(&mut alice_rx), ["alice: only general"]);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn join_creates_channel_and_announces_to_it_only() {
        let engine = test_engine(Duration::from_secs(60));
        let (_alice, mut alice_rx) = connect(&engine, "alice").await;
        let (bob, mut bob_rx) = connect(&engine, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        engine.on_message(&bob.conn_id, "/join #dev").await;

        assert!(engine.store().channel_exists("#dev").await.unwrap());
        assert_eq!(drain(&mut bob_rx), ["Server: bob joined channel '#dev'."]);
        assert!(drain(&mut alice_rx).is_empty());

        // The announcement is not persisted.
        assert!(
            engine
                .store()
                .fetch_history("#dev", 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rejoining_the_same_channel_reannounces() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        engine.on_message(&alice.conn_id, "/join #general").await;

        assert_eq!(drain(&mut rx), ["Server: alice joined channel '#general'."]);
    }

    #[tokio::test]
    async fn join_without_marker_is_rejected() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        engine.on_message(&alice.conn_id, "/join dev").await;

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Server: error:"), "got: {}", lines[0]);
        assert!(!engine.store().channel_exists("dev").await.unwrap());
    }

    #[tokio::test]
    async fn private_message_reaches_only_the_target() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        let (_bob, mut bob_rx) = connect(&engine, "bob").await;
        let (_carol, mut carol_rx) = connect(&engine, "carol").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);
        drain(&mut carol_rx);

        engine.on_message(&alice.conn_id, "/msg bob hi there").await;

        assert_eq!(drain(&mut bob_rx), ["alice (private): hi there"]);
        assert!(drain(&mut carol_rx).is_empty());
        assert_eq!(
            drain(&mut alice_rx),
            ["Server: private message sent to bob."]
        );
    }

    #[tokio::test]
    async fn private_message_to_unknown_user_reports_not_found() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        engine.on_message(&alice.conn_id, "/msg ghost boo").await;

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("no connected user named 'ghost'"));
    }

    #[tokio::test]
    async fn rename_permits_duplicates_and_lookup_is_first_match() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        let (bob, mut bob_rx) = connect(&engine, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        engine.on_message(&bob.conn_id, "/name alice").await;
        assert_eq!(drain(&mut bob_rx), ["Server: name changed to alice"]);

        // Two sessions hold the same name; the earliest registration wins.
        let resolved = engine.lookup_session("alice").await.unwrap();
        assert_eq!(resolved.conn_id, alice.conn_id);
    }

    #[tokio::test]
    async fn history_command_replays_recent_messages() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        for text in ["m1", "m2", "m3"] {
            engine.on_message(&alice.conn_id, text).await;
        }
        drain(&mut rx);

        engine.on_message(&alice.conn_id, "/history 2").await;

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Server: last 2 messages in '#general':");
        assert_eq!(lines[1], "alice: m2");
        assert_eq!(lines[2], "alice: m3");
    }

    #[tokio::test]
    async fn history_rejects_a_non_numeric_limit() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        engine.on_message(&alice.conn_id, "/history lots").await;

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Server: error: invalid input"));
    }

    #[tokio::test]
    async fn channels_and_users_commands_list_state() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        let (bob, mut bob_rx) = connect(&engine, "bob").await;
        engine.on_message(&bob.conn_id, "/join #dev").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        engine.on_message(&alice.conn_id, "/channels").await;
        assert_eq!(drain(&mut alice_rx), ["Server: channels: #dev, #general"]);

        engine.on_message(&alice.conn_id, "/users").await;
        assert_eq!(drain(&mut alice_rx), ["Server: connected users: alice, bob"]);
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        engine.on_message(&alice.conn_id, "/ping").await;

        assert_eq!(drain(&mut rx), ["Server: pong"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_disconnected_after_the_interval() {
        let engine = test_engine(Duration::from_secs(30));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);
        settle().await;

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;

        assert!(engine.lookup_session("alice").await.is_err());
        assert_eq!(engine.session_count().await, 0);

        let lines = drain(&mut rx);
        assert_eq!(lines, ["Server: disconnected: keepalive timeout."]);

        // With the test's own view gone, no sender remains: the engine
        // dropped its copy with the session, which is what tells the
        // transport write loop to close the socket.
        drop(alice);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshing_at_half_interval_keeps_the_session_alive() {
        let engine = test_engine(Duration::from_secs(30));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(15)).await;
            settle().await;
            engine.on_message(&alice.conn_id, "/ping").await;
        }

        // 90s of wall time, never 30s of silence.
        assert!(engine.lookup_session("alice").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_cannot_remove_a_refreshed_session() {
        let engine = test_engine(Duration::from_secs(30));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        // Re-arm just before expiry; the connect-time timer epoch is stale.
        tokio::time::advance(Duration::from_secs(29)).await;
        engine.on_keepalive_refresh(&alice.conn_id).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(engine.lookup_session("alice").await.is_ok());

        // A fired callback that was already mid-flight when the refresh
        // happened carries the old epoch and must not remove the session.
        engine.keepalive_timeout(&alice.conn_id, 1).await;
        assert!(engine.lookup_session("alice").await.is_ok());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_removes_session_and_disarms_timer() {
        let engine = test_engine(Duration::from_secs(30));
        let (alice, mut rx) = connect(&engine, "alice").await;
        drain(&mut rx);

        engine.on_disconnect(&alice.conn_id).await;
        assert!(engine.lookup_session("alice").await.is_err());

        // A second disconnect is a no-op.
        engine.on_disconnect(&alice.conn_id).await;

        // The timer was cancelled with the removal: advancing past the
        // interval produces no timeout notice.
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn messages_from_a_removed_session_are_dropped() {
        let engine = test_engine(Duration::from_secs(60));
        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        let (_bob, mut bob_rx) = connect(&engine, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        engine.on_disconnect(&alice.conn_id).await;
        engine.on_message(&alice.conn_id, "ghost message").await;

        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn end_to_end_connect_message_join_flow() {
        let engine = test_engine(Duration::from_secs(60));

        let (alice, mut alice_rx) = connect(&engine, "alice").await;
        assert!(engine.store().channel_exists("#general").await.unwrap());
        drain(&mut alice_rx);

        engine.on_message(&alice.conn_id, "hello").await;
        assert_eq!(drain(&mut alice_rx), ["alice: hello"]);
        let history = engine.store().fetch_history("#general", 10).await.unwrap();
        assert_eq!(history.len(), 1);

        let (bob, mut bob_rx) = connect(&engine, "bob").await;
        drain(&mut bob_rx);
        drain(&mut alice_rx);

        engine.on_message(&bob.conn_id, "/join #dev").await;
        assert!(engine.store().channel_exists("#dev").await.unwrap());
        assert_eq!(drain(&mut bob_rx), ["Server: bob joined channel '#dev'."]);
        assert!(drain(&mut alice_rx).is_empty());
    }
}
