//! Configuration loading and env substitution.
//!
//! Config files: `beachat.toml`, `beachat.yaml`, or `beachat.json`
//! Searched in `./` then `~/.config/beachat/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw config text.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config},
    schema::{BeachatConfig, ChatConfig, DatabaseConfig, KeepaliveConfig, ServerConfig},
};
