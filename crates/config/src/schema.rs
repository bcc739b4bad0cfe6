use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level broker configuration. Every section and field is optional in
/// the config file; anything missing takes the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeachatConfig {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub keepalive: KeepaliveConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the gateway binds to.
    pub bind: String,
    /// Port the gateway listens on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Channel every session is joined to on connect.
    pub default_channel: String,
    /// `/history` entry count when the command gives no explicit limit.
    pub history_limit: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_channel: "#general".into(),
            history_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepaliveConfig {
    /// Seconds a session may stay silent before it is disconnected.
    pub interval_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database file. Defaults to `beachat.db` in the data directory.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// The configured path, or the default location under the data dir.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("beachat.db"))
    }
}
