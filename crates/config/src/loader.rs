use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::BeachatConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["beachat.toml", "beachat.yaml", "beachat.yml", "beachat.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BeachatConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./beachat.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/beachat/beachat.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BeachatConfig::default()` if no config file is found, and falls
/// back to defaults (with a warning) if one is found but does not parse.
pub fn discover_and_load() -> BeachatConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(config) => return config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    BeachatConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/beachat/
    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// The user-global config directory (`~/.config/beachat/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "beachat").map(|d| d.config_dir().to_path_buf())
}

/// The data directory used for the default database location. Falls back to
/// `.beachat` in the working directory if the platform dirs are unavailable.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "beachat")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".beachat"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BeachatConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "beachat.toml", "[server]\nport = 9000\n");

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "beachat.yaml", "chat:\n  default_channel: '#lobby'\n");

        let config = load_config(&path).unwrap();
        assert_eq!(config.chat.default_channel, "#lobby");
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "beachat.json", r#"{"keepalive": {"interval_secs": 5}}"#);

        let config = load_config(&path).unwrap();
        assert_eq!(config.keepalive.interval_secs, 5);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/definitely/not/here/beachat.toml")).is_err());
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "beachat.ini", "[server]\n");
        assert!(load_config(&path).is_err());
    }
}
