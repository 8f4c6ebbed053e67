//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the path given with `--config`
//! 2. `$IMAPINDEXER_CONFIG` (environment variable)
//! 3. `~/.config/imapindexer/config.toml` (Linux/macOS)
//!    `%APPDATA%\imapindexer\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! Values are passed explicitly to each pipeline component; nothing here is
//! global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

/// Default IMAPS port used when the address carries none.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail server connection and fetch settings.
    pub imap: ImapConfig,
    /// Search backend settings.
    pub zinc: ZincConfig,
    /// Pipeline sizing.
    pub indexer: IndexerConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Draw progress bars instead of logging to stderr.
    pub progress: bool,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Mail server settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    /// `host[:port]`; the port defaults to 993 (implicit TLS).
    pub address: String,
    pub username: String,
    pub password: String,
    /// Mailbox pattern passed to LIST (`*` and `%` wildcards).
    pub mailbox: String,
    /// Compute a SHA-256 content hash for every message.
    pub use_hash: bool,
}

/// Search backend settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZincConfig {
    /// Base URL, e.g. `http://localhost:4080`.
    pub address: String,
    pub username: String,
    pub password: String,
    /// Target index name.
    pub index: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Pipeline sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Maximum number of concurrently running fetch workers.
    pub workers: usize,
    /// Capacity of the message queue between fetchers and the indexer.
    pub buffer: usize,
    /// Number of documents per bulk-ingest call.
    pub batch: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            progress: false,
            log_dir: None,
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            username: String::new(),
            password: String::new(),
            mailbox: "INBOX".to_string(),
            use_hash: false,
        }
    }
}

impl Default for ZincConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:4080".to_string(),
            username: String::new(),
            password: String::new(),
            index: "mail_index".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            buffer: 100,
            batch: 100,
        }
    }
}

// Credentials stay out of debug output.
impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("mailbox", &self.mailbox)
            .field("use_hash", &self.use_hash)
            .finish()
    }
}

impl std::fmt::Debug for ZincConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZincConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("index", &self.index)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ImapConfig {
    /// Split `address` into host and port, applying [`DEFAULT_IMAP_PORT`].
    pub fn host_and_port(&self) -> Result<(String, u16)> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(IndexerError::InvalidConfig(
                "imap.address is empty".to_string(),
            ));
        }

        // Bracketed IPv6 literals contain colons of their own.
        let port_sep = if address.starts_with('[') {
            address.rfind("]:").map(|i| i + 1)
        } else if address.matches(':').count() == 1 {
            address.rfind(':')
        } else {
            None
        };

        match port_sep {
            Some(i) => {
                let port = address[i + 1..].parse::<u16>().map_err(|_| {
                    IndexerError::InvalidConfig(format!("invalid port in imap.address '{address}'"))
                })?;
                Ok((unbracket(&address[..i]), port))
            }
            None => Ok((unbracket(address), DEFAULT_IMAP_PORT)),
        }
    }
}

fn unbracket(host: &str) -> String {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
        .to_string()
}

impl ZincConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Reject values that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.imap.address.trim().is_empty() {
            return Err(IndexerError::InvalidConfig("imap.address is required".into()));
        }
        self.imap.host_and_port()?;
        if self.zinc.address.trim().is_empty() {
            return Err(IndexerError::InvalidConfig("zinc.address is required".into()));
        }
        if self.zinc.index.trim().is_empty() {
            return Err(IndexerError::InvalidConfig("zinc.index is required".into()));
        }
        if self.indexer.workers == 0 {
            return Err(IndexerError::InvalidConfig(
                "indexer.workers must be at least 1".into(),
            ));
        }
        if self.indexer.batch == 0 {
            return Err(IndexerError::InvalidConfig(
                "indexer.batch must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration from `explicit` or the standard locations.
///
/// A missing file yields the defaults. A file that exists but cannot be
/// read or parsed is an error: silently indexing with default credentials
/// is never what the user wants.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match config_file_path() {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {e}", path.display()))?;
    let cfg = toml::from_str::<Config>(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("IMAPINDEXER_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("imapindexer").join("config.toml"))
}

/// Return the directory for log files.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imapindexer")
}
