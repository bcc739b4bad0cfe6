use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::{Error, Result};

// ── Session ──────────────────────────────────────────────────────────────────

/// Server-side record of one connected, named client.
///
/// Owned exclusively by the [`SessionRegistry`]. The transport handle is an
/// outbound line channel: the engine never touches the socket itself, it
/// drops the sender to signal the transport to finish.
#[derive(Debug)]
pub struct Session {
    /// Registry key standing in for the transport handle (UUID v4).
    pub conn_id: String,
    /// Display name. Mutable; duplicates across sessions are permitted.
    pub name: String,
    /// Name of the channel this session is currently bound to.
    pub channel: String,
    /// Channel for sending text lines to this session's transport write loop.
    pub sender: mpsc::UnboundedSender<String>,
    /// Pending keepalive timeout task, at most one at any instant.
    pub(crate) keepalive: Option<JoinHandle<()>>,
    /// Generation counter distinguishing a stale timer firing from a live one.
    pub(crate) keepalive_epoch: u64,
}

impl Session {
    pub fn new(
        conn_id: impl Into<String>,
        name: impl Into<String>,
        channel: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            name: name.into(),
            channel: channel.into(),
            sender,
            keepalive: None,
            keepalive_epoch: 0,
        }
    }

    /// Send a text line to this session. Returns false if the transport side
    /// is gone; the caller decides whether that matters.
    pub fn send(&self, line: &str) -> bool {
        self.sender.send(line.to_string()).is_ok()
    }

    /// Point-in-time copy of this session for use outside the registry lock.
    pub fn view(&self) -> SessionView {
        SessionView {
            conn_id: self.conn_id.clone(),
            name: self.name.clone(),
            channel: self.channel.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Removing a session from the registry cancels its timer.
        if let Some(handle) = self.keepalive.take() {
            handle.abort();
        }
    }
}

// ── Session view ─────────────────────────────────────────────────────────────

/// Cloned, lock-free copy of a session used during fan-out and command
/// handling. Sends through a view after the session was removed fail
/// silently (the transport is already closing).
#[derive(Debug, Clone)]
pub struct SessionView {
    pub conn_id: String,
    pub name: String,
    pub channel: String,
    sender: mpsc::UnboundedSender<String>,
}

impl SessionView {
    pub fn new(
        conn_id: impl Into<String>,
        name: impl Into<String>,
        channel: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            name: name.into(),
            channel: channel.into(),
            sender,
        }
    }

    pub fn send(&self, line: &str) -> bool {
        self.sender.send(line.to_string()).is_ok()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// The single shared table of live sessions.
///
/// Backed by a `Vec` so enumeration order is insertion order and name
/// lookups resolve deterministically to the earliest match. The registry
/// itself is not synchronized; the engine guards it as a whole with one
/// `RwLock`, never per-session locks, because broadcast enumerates across
/// all sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Fails if the same connection id is already registered.
    pub fn register(&mut self, session: Session) -> Result<()> {
        if self.sessions.iter().any(|s| s.conn_id == session.conn_id) {
            return Err(Error::duplicate_session(&session.conn_id));
        }
        self.sessions.push(session);
        Ok(())
    }

    /// Look up a session by display name: exact, case-sensitive, first match
    /// in insertion order. Duplicate names are permitted, so the first match
    /// is the documented resolution.
    pub fn lookup(&self, name: &str) -> Result<SessionView> {
        self.sessions
            .iter()
            .find(|s| s.name == name)
            .map(Session::view)
            .ok_or_else(|| Error::user_not_found(name))
    }

    pub fn get(&self, conn_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.conn_id == conn_id)
    }

    pub fn get_mut(&mut self, conn_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.conn_id == conn_id)
    }

    /// Snapshot of all connected sessions in insertion order.
    pub fn all(&self) -> Vec<SessionView> {
        self.sessions.iter().map(Session::view).collect()
    }

    /// Remove a session. Idempotent: returns None if it was already gone.
    /// Dropping the removed entry aborts its keepalive timer.
    pub fn remove(&mut self, conn_id: &str) -> Option<Session> {
        self.sessions
            .iter()
            .position(|s| s.conn_id == conn_id)
            .map(|idx| self.sessions.remove(idx))
    }

    /// Change a session's display name in place. No collision check:
    /// duplicate display names are a documented limitation, not rejected.
    /// Returns false if the session is no longer registered.
    pub fn rename(&mut self, conn_id: &str, new_name: &str) -> bool {
        match self.get_mut(conn_id) {
            Some(session) => {
                session.name = new_name.to_string();
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
