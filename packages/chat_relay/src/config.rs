use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

// =============================================================================
// File config (figment-deserialized from defaults / chat-relay.toml / env vars)
// =============================================================================
//
//   chat-relay.toml:  [server]
//                     port = 6000
//
//   env var:          CHAT_SERVER__PORT=6000   (double underscore = nesting)

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "chat-relay.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener and page settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTML document served at `/`.
    #[serde(default = "default_page")]
    pub page: PathBuf,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            page: default_page(),
        }
    }
}

/// Relay tunables (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// Bound on queued join/publish commands before read loops wait.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// Undelivered frames a single peer may have queued before it is dropped.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            command_capacity: default_command_capacity(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5555
}
fn default_page() -> PathBuf {
    PathBuf::from("index.html")
}
fn default_command_capacity() -> usize {
    256
}
fn default_outbound_capacity() -> usize {
    crate::registry::DEFAULT_OUTBOUND_CAPACITY
}

/// Build a figment that layers: defaults → TOML file → CHAT_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHAT_SERVER__HOST=127.0.0.1`  →  `server.host = "127.0.0.1"`
///   `CHAT_RELAY__COMMAND_CAPACITY=64`  →  `relay.command_capacity = 64`
///   `CHAT_RELAY__OUTBOUND_CAPACITY=16`  →  `relay.outbound_capacity = 16`
pub fn load_config(config_file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let path = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CHAT_").split("__"))
}

/// Command-line values that win over every file/env layer.
#[derive(Clone, Debug, Default)]
pub struct RuntimeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub page: Option<PathBuf>,
}

// =============================================================================
// Runtime config (derived from FileConfig + overrides)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub page_path: PathBuf,
    pub command_capacity: usize,
    pub outbound_capacity: usize,
}

impl ServerConfig {
    pub fn resolve(fc: &FileConfig, overrides: &RuntimeOverrides) -> Result<Self> {
        let host = overrides.host.as_deref().unwrap_or(&fc.server.host);
        let port = overrides.port.unwrap_or(fc.server.port);
        let bind_addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

        Ok(Self {
            bind_addr,
            page_path: overrides
                .page
                .clone()
                .unwrap_or_else(|| fc.server.page.clone()),
            command_capacity: fc.relay.command_capacity.max(1),
            outbound_capacity: fc.relay.outbound_capacity.max(1),
        })
    }
}
