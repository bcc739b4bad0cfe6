//! Built-in command set registered on every engine.

use std::{future::Future, sync::Arc};

use tracing::warn;

use crate::{
    Result,
    broadcast,
    dispatch::{CommandTable, HandlerFn},
    engine::Engine,
    error::Error,
    registry::SessionView,
};

/// Marker character every channel name must begin with.
pub const CHANNEL_MARKER: char = '#';

const HELP_LINES: &[&str] = &[
    "Server: available commands:",
    "Server:   /channels            list all channels",
    "Server:   /help                show this text",
    "Server:   /history [n]         replay the last n messages of your channel",
    "Server:   /join #channel       join (or create) a channel",
    "Server:   /msg <user> <text>   send a private message",
    "Server:   /name <newName>      change your display name",
    "Server:   /ping                refresh your keepalive timer",
    "Server:   /users               list connected users",
    "Server: anything else is sent to your current channel.",
];

fn wrap<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Vec<String>, SessionView, Arc<Engine>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |tokens, session, engine| Box::pin(f(tokens, session, engine)))
}

/// The default command table, in registration (= match priority) order.
/// The empty trigger is the plain-channel-message fallback and goes last.
pub(crate) fn builtin_table() -> CommandTable {
    let mut table = CommandTable::new();
    table.register("/channels", wrap(cmd_channels));
    table.register("/help", wrap(cmd_help));
    table.register("/history", wrap(cmd_history));
    table.register("/join", wrap(cmd_join));
    table.register("/msg", wrap(cmd_msg));
    table.register("/name", wrap(cmd_name));
    table.register("/ping", wrap(cmd_ping));
    table.register("/users", wrap(cmd_users));
    table.register("", wrap(cmd_fallback));
    table
}

async fn cmd_channels(_tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let channels = engine.store().list_channels().await?;
    session.send(&format!("Server: channels: {}", channels.join(", ")));
    Ok(())
}

async fn cmd_help(_tokens: Vec<String>, session: SessionView, _engine: Arc<Engine>) -> Result<()> {
    for line in HELP_LINES {
        session.send(line);
    }
    Ok(())
}

async fn cmd_history(tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let limit = match tokens.get(1) {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| Error::invalid_input(format!("'{raw}' is not a number")))?,
        None => engine.history_limit(),
    };
    let entries = engine.store().fetch_history(&session.channel, limit).await?;
    session.send(&format!(
        "Server: last {} messages in '{}':",
        entries.len(),
        session.channel
    ));
    for entry in entries {
        session.send(&entry.body);
    }
    Ok(())
}

async fn cmd_join(tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let channel = tokens
        .get(1)
        .ok_or_else(|| Error::invalid_input("usage: /join #channel"))?;
    if !channel.starts_with(CHANNEL_MARKER) {
        return Err(Error::invalid_input(format!(
            "channel names must start with '{CHANNEL_MARKER}'"
        )));
    }
    broadcast::join(&engine, &session.conn_id, channel).await
}

async fn cmd_msg(tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let target = tokens
        .get(1)
        .ok_or_else(|| Error::invalid_input("usage: /msg <user> <message>"))?;
    let body = tokens[2..].join(" ");
    if body.is_empty() {
        return Err(Error::invalid_input("usage: /msg <user> <message>"));
    }
    let recipient = engine.lookup_session(target).await?;
    recipient.send(&format!("{} (private): {}", session.name, body));
    session.send(&format!("Server: private message sent to {target}."));
    Ok(())
}

async fn cmd_name(tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let new_name = tokens
        .get(1)
        .ok_or_else(|| Error::invalid_input("usage: /name <newName>"))?;
    engine.rename(&session.conn_id, new_name).await;
    session.send(&format!("Server: name changed to {new_name}"));
    Ok(())
}

async fn cmd_ping(_tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    engine.on_keepalive_refresh(&session.conn_id).await;
    session.send("Server: pong");
    Ok(())
}

async fn cmd_users(_tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let names: Vec<String> = engine.sessions().await.into_iter().map(|s| s.name).collect();
    session.send(&format!("Server: connected users: {}", names.join(", ")));
    Ok(())
}

/// Fallback: any non-command line is a channel message. A history append
/// failure is logged and swallowed here: the broadcast already went out,
/// and a flaky store must not surface as a command error on every message.
async fn cmd_fallback(tokens: Vec<String>, session: SessionView, engine: Arc<Engine>) -> Result<()> {
    let text = format!("{}: {}", session.name, tokens.join(" "));
    match broadcast::broadcast(&engine, &session.channel, &text, true).await {
        Err(Error::Persistence { context, source }) => {
            warn!(channel = %session.channel, %context, %source, "history append failed, message delivered anyway");
            Ok(())
        },
        other => other,
    }
}
