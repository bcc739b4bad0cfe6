use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    beachat_engine::Engine,
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

/// Drive a single WebSocket connection through its full lifecycle:
/// register with the engine → message loop → cleanup.
pub async fn handle_connection(
    socket: WebSocket,
    engine: Arc<Engine>,
    name: String,
    remote_addr: SocketAddr,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards engine lines to the socket. Finishes when every
    // sender is gone, i.e. when the engine has removed the session; that is
    // how a forced disconnect (keepalive timeout) closes the connection.
    let mut write_handle = tokio::spawn(async move {
        while let Some(line) = client_rx.recv().await {
            if ws_tx.send(Message::Text(line.into())).await.is_err() {
                break;
            }
        }
    });

    // Keep only the conn id: holding the returned view would keep a sender
    // clone alive and the write loop with it.
    let conn_id = match engine.on_connect(&name, client_tx).await {
        Ok(view) => view.conn_id,
        Err(e) => {
            warn!(name = %name, error = %e, "ws: connect failed");
            write_handle.abort();
            return;
        },
    };
    info!(conn_id = %conn_id, name = %name, remote = %remote_addr, "ws: connection open");

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        engine.on_message(&conn_id, text.as_str()).await;
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // binary/ping/pong frames ignored
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "ws: read error");
                        break;
                    },
                }
            },
            // Engine dropped the session's sender (forced disconnect).
            _ = &mut write_handle => break,
        }
    }

    engine.on_disconnect(&conn_id).await;
    write_handle.abort();
    info!(conn_id = %conn_id, "ws: connection closed");
}
