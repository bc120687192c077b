//! Configuration store: persisted rule set and node connection parameters
//!
//! The whole document lives in one JSON file (`~/.autosend/config.json` by
//! default), loaded once at process start and written wholesale after every
//! mutating command. Execution never writes it. Concurrent invocations
//! against the same file are the caller's responsibility; there is no lock
//! file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::rules::RuleParams;

/// Connection parameters for the bitcoind JSON-RPC endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConnection {
    pub user: String,
    pub pass: String,
    pub host: String,
    pub port: u16,
    /// Request timeout for node RPC calls
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30000
}

impl Default for NodeConnection {
    fn default() -> Self {
        Self {
            user: "bitcoinrpc".to_string(),
            pass: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8333,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl NodeConnection {
    /// Build connection parameters from the node's own config file,
    /// falling back to defaults for anything absent. A missing file is
    /// not an error.
    pub fn from_bitcoin_conf<P: AsRef<Path>>(path: P) -> Self {
        let mut conn = Self::default();
        let Ok(contents) = std::fs::read_to_string(path.as_ref()) else {
            debug!(
                "No node config at {}, using defaults",
                path.as_ref().display()
            );
            return conn;
        };

        for line in contents.lines() {
            let Some((key, value)) = line.trim_end().split_once('=') else {
                continue;
            };
            match key {
                "rpcuser" => conn.user = value.to_string(),
                "rpcpassword" => conn.pass = value.to_string(),
                "rpcconnect" => conn.host = value.to_string(),
                "rpcport" => {
                    if let Ok(port) = value.parse() {
                        conn.port = port;
                    }
                }
                _ => {}
            }
        }
        conn
    }
}

/// The persisted configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleParams>,
    pub bitcoind: NodeConnection,
}

/// Loaded configuration plus the path it round-trips through
pub struct ConfigStore {
    path: PathBuf,
    pub doc: ConfigDocument,
}

impl ConfigStore {
    /// Default location of the config document
    pub fn default_path() -> PathBuf {
        home_dir().join(".autosend").join("config.json")
    }

    /// Default location of the node's own config file
    pub fn default_bitcoin_conf() -> PathBuf {
        home_dir().join(".bitcoin").join("bitcoin.conf")
    }

    /// Load the document, or start a fresh one with connection parameters
    /// defaulted from the node's config file when ours does not exist yet.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, starting fresh", path.display());
                ConfigDocument {
                    rules: BTreeMap::new(),
                    bitcoind: NodeConnection::from_bitcoin_conf(Self::default_bitcoin_conf()),
                }
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self { path, doc })
    }

    /// Write the whole document back out, creating the parent directory
    /// on first save.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(&self.doc)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Io(format!("Failed to write {}: {}", self.path.display(), e)))?;

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    /// Read a connection parameter by dotted name
    pub fn get_param(&self, name: &str) -> Result<String> {
        let conn = &self.doc.bitcoind;
        match name {
            "bitcoind.user" => Ok(conn.user.clone()),
            "bitcoind.password" => Ok(conn.pass.clone()),
            "bitcoind.host" => Ok(conn.host.clone()),
            "bitcoind.port" => Ok(conn.port.to_string()),
            "bitcoind.timeout_ms" => Ok(conn.timeout_ms.to_string()),
            _ => Err(Error::UnknownParameter(name.to_string())),
        }
    }

    /// Set a connection parameter by dotted name. The caller saves.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        let conn = &mut self.doc.bitcoind;
        match name {
            "bitcoind.user" => conn.user = value.to_string(),
            "bitcoind.password" => conn.pass = value.to_string(),
            "bitcoind.host" => conn.host = value.to_string(),
            "bitcoind.port" => {
                conn.port = value
                    .parse()
                    .map_err(|_| Error::Config(format!("Invalid port: {}", value)))?;
            }
            "bitcoind.timeout_ms" => {
                conn.timeout_ms = value
                    .parse()
                    .map_err(|_| Error::Config(format!("Invalid timeout: {}", value)))?;
            }
            _ => return Err(Error::UnknownParameter(name.to_string())),
        }
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
