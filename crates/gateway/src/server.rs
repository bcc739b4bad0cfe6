use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{ConnectInfo, Query, State, WebSocketUpgrade},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    serde::Deserialize,
    tower_http::cors::{Any, CorsLayer},
    tracing::{info, warn},
};

use {
    beachat_config::BeachatConfig,
    beachat_engine::{ChannelStore, Engine, EngineConfig, MemoryChannelStore},
};

use crate::{channel_store::SqliteChannelStore, ws};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the broker router (shared between production startup and tests).
pub fn build_app(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .layer(cors)
        .with_state(AppState { engine })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.engine.session_count().await,
    }))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    name: Option<String>,
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    // Identity comes in out-of-band on the query string; refusing a missing
    // name is a transport concern, the engine never sees the connection.
    let Some(name) = query.name.filter(|n| !n.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing 'name' query parameter").into_response();
    };
    ws.on_upgrade(move |socket| ws::handle_connection(socket, state.engine, name, remote_addr))
        .into_response()
}

// ── Store wiring ─────────────────────────────────────────────────────────────

/// Open the SQLite channel store configured in `config`, falling back to the
/// in-memory store (with a warning) if the database cannot be opened.
pub async fn open_store(config: &BeachatConfig) -> Arc<dyn ChannelStore> {
    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    match sqlx::SqlitePool::connect(&db_url).await {
        Ok(pool) => match SqliteChannelStore::init(&pool).await {
            Ok(()) => {
                info!(path = %db_path.display(), "channel history database ready");
                Arc::new(SqliteChannelStore::new(pool))
            },
            Err(e) => {
                warn!(error = %e, "failed to init channel tables, history will not persist");
                Arc::new(MemoryChannelStore::new())
            },
        },
        Err(e) => {
            warn!(path = %db_path.display(), error = %e, "sqlite unavailable, history will not persist");
            Arc::new(MemoryChannelStore::new())
        },
    }
}

fn engine_config(config: &BeachatConfig) -> EngineConfig {
    EngineConfig {
        default_channel: config.chat.default_channel.clone(),
        keepalive_interval: Duration::from_secs(config.keepalive.interval_secs),
        history_limit: config.chat.history_limit,
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Start the broker: open the store, build the engine, serve HTTP + WS.
pub async fn start_gateway(config: BeachatConfig) -> anyhow::Result<()> {
    let store = open_store(&config).await;
    let engine = Engine::new(store, engine_config(&config));
    let app = build_app(engine);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "beachat gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
