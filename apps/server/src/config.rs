//! Server configuration management.
//!
//! Configuration is stored as TOML at `$CHUNKDROP_CONFIG` if set, otherwise:
//! - Linux: `~/.config/chunkdrop/server.toml`
//! - Windows: `%APPDATA%/chunkdrop/server.toml`

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chunkdrop_server::ServerConfig;
use chunkdrop_store::{DEFAULT_MAX_CHUNK_BYTES, DEFAULT_MERGE_CONCURRENCY};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file path.
const CONFIG_ENV: &str = "CHUNKDROP_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Directory holding chunk directories and merged files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Largest accepted chunk payload in bytes.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: u64,

    /// Concurrent chunk writes per merge.
    #[serde(default = "default_merge_concurrency")]
    pub merge_concurrency: usize,
}

fn default_listen_addr() -> SocketAddr {
    ([0, 0, 0, 0], 3000).into()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_chunk_bytes() -> u64 {
    DEFAULT_MAX_CHUNK_BYTES
}

fn default_merge_concurrency() -> usize {
    DEFAULT_MERGE_CONCURRENCY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upload_dir: default_upload_dir(),
            max_chunk_bytes: default_max_chunk_bytes(),
            merge_concurrency: default_merge_concurrency(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn into_server_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen_addr,
            upload_dir: self.upload_dir,
            max_chunk_bytes: self.max_chunk_bytes,
            merge_concurrency: self.merge_concurrency,
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkdrop").join("server.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("chunkdrop")
            .join("server.toml")
    }
}
