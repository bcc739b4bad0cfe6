use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    beachat_config::BeachatConfig,
    beachat_engine::{CHANNEL_MARKER, ChannelStore as _, Error},
    beachat_gateway::open_store,
};

#[derive(Parser)]
#[command(name = "beachat", about = "Beachat, a multi-channel chat broker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true, env = "BEACHAT_BIND")]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true, env = "BEACHAT_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config value).
    #[arg(long, global = true, env = "BEACHAT_DB")]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the broker (default when no subcommand is provided).
    Gateway,
    /// Channel management against the history database.
    Channels {
        #[command(subcommand)]
        action: ChannelAction,
    },
    /// Print the most recent messages of a channel.
    History {
        /// Channel name, including the leading '#'.
        channel: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum ChannelAction {
    /// List all channels.
    List,
    /// Create a channel explicitly.
    Create {
        /// Channel name, including the leading '#'.
        name: String,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = beachat_config::discover_and_load();
    if let Some(bind) = cli.bind.clone() {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(db) = cli.database.clone() {
        config.database.path = Some(db);
    }

    match cli.command.unwrap_or(Commands::Gateway) {
        Commands::Gateway => beachat_gateway::start_gateway(config).await,
        Commands::Channels { action } => channels_command(&config, action).await,
        Commands::History { channel, limit } => history_command(&config, &channel, limit).await,
    }
}

async fn channels_command(config: &BeachatConfig, action: ChannelAction) -> anyhow::Result<()> {
    let store = open_store(config).await;
    match action {
        ChannelAction::List => {
            for name in store.list_channels().await? {
                println!("{name}");
            }
        },
        ChannelAction::Create { name } => {
            if !name.starts_with(CHANNEL_MARKER) {
                return Err(Error::invalid_input(format!(
                    "channel names must start with '{CHANNEL_MARKER}'"
                ))
                .into());
            }
            if store.channel_exists(&name).await? {
                return Err(Error::channel_exists(&name).into());
            }
            store.create_channel_if_absent(&name).await?;
            println!("created channel '{name}'");
        },
    }
    Ok(())
}

async fn history_command(config: &BeachatConfig, channel: &str, limit: u32) -> anyhow::Result<()> {
    let store = open_store(config).await;
    if !store.channel_exists(channel).await? {
        return Err(Error::channel_not_found(channel).into());
    }
    for entry in store.fetch_history(channel, limit).await? {
        println!("{}", entry.body);
    }
    Ok(())
}
