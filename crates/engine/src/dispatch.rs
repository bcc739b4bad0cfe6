use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{debug, warn};

use crate::{Result, engine::Engine, registry::SessionView};

/// A command handler. Receives the whitespace-split tokens of the inbound
/// line, a point-in-time view of the invoking session, and the engine to
/// call back into.
pub type HandlerFn = Arc<
    dyn Fn(Vec<String>, SessionView, Arc<Engine>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

struct CommandEntry {
    trigger: String,
    handler: HandlerFn,
}

/// Ordered table of `(trigger, handler)` pairs.
///
/// Registration order is match priority: dispatch scans the table front to
/// back and the first entry whose trigger is a prefix of the inbound text
/// wins. The empty trigger matches everything and is conventionally
/// registered last as the plain-channel-message fallback. Order is a
/// first-class invariant here, not an accident of iteration.
#[derive(Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. An identical trigger registered later never runs:
    /// the earlier registration still matches first.
    pub fn register(&mut self, trigger: impl Into<String>, handler: HandlerFn) {
        self.entries.push(CommandEntry {
            trigger: trigger.into(),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Route one inbound line. At most one handler runs; empty input is
    /// ignored; a handler failure is logged and reported to the invoking
    /// session as a text line, never propagated.
    pub async fn dispatch(&self, text: &str, session: SessionView, engine: Arc<Engine>) {
        if text.trim().is_empty() {
            return;
        }
        let Some(entry) = self.entries.iter().find(|e| text.starts_with(&e.trigger)) else {
            debug!(conn_id = %session.conn_id, "no matching command trigger");
            return;
        };
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        debug!(conn_id = %session.conn_id, trigger = %entry.trigger, "dispatching command");
        if let Err(e) = (entry.handler)(tokens, session.clone(), engine).await {
            warn!(conn_id = %session.conn_id, error = %e, "command handler failed");
            session.send(&format!("Server: error: {e}"));
        }
    }
}
