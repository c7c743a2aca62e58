//! Configuration parsing and validation.
//!
//! blobprocd reads an optional TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a runnable configuration. Command
//! line flags are applied on top of the parsed values in `main.rs`, after
//! which [`Config::validate`] is run once more.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//! timeout_secs = 15
//!
//! [spool]
//! dir = "/var/lib/blobproc/spool"
//!
//! [urlmap]
//! path = "/var/lib/blobproc/urlmap.db"
//! header = "X-BLOBPROC-URL"
//!
//! [log]
//! debug = false
//! file = "/var/log/blobproc/blobprocd.json"
//! access_log = "/var/log/blobproc/access.log"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP header carrying the originating URL of a payload.
pub const DEFAULT_URLMAP_HEADER: &str = "X-BLOBPROC-URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(default)]
    pub urlmap: UrlMapConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Read and write deadline for a single request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_body_bytes() -> usize {
    1 << 30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpoolConfig {
    #[serde(default = "default_spool_dir")]
    pub dir: PathBuf,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            dir: default_spool_dir(),
        }
    }
}

/// `$XDG_DATA_HOME/blobproc/spool`, or a relative `blobproc/spool` if the
/// platform has no data directory.
fn default_spool_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blobproc")
        .join("spool")
}

/// Provenance recording. Nothing is recorded unless `path` is set.
#[derive(Debug, Deserialize, Clone)]
pub struct UrlMapConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_urlmap_header")]
    pub header: String,
}

impl Default for UrlMapConfig {
    fn default() -> Self {
        Self {
            path: None,
            header: default_urlmap_header(),
        }
    }
}

fn default_urlmap_header() -> String {
    DEFAULT_URLMAP_HEADER.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub debug: bool,
    /// Structured log output; stderr if unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Access log output; discarded if unset.
    #[serde(default)]
    pub access_log: Option<PathBuf>,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.timeout_secs == 0 {
            anyhow::bail!("server.timeout_secs must be > 0");
        }
        if self.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be > 0");
        }
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("server.bind is not a socket address: '{}'", self.server.bind))?;
        if self.urlmap.header.trim().is_empty() {
            anyhow::bail!("urlmap.header must not be empty");
        }
        axum::http::HeaderName::try_from(self.urlmap.header.as_str())
            .with_context(|| format!("urlmap.header is not a valid header name: '{}'", self.urlmap.header))?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.server.timeout_secs, 15);
        assert_eq!(config.urlmap.header, DEFAULT_URLMAP_HEADER);
        assert!(config.urlmap.path.is_none());
        assert!(config.spool.dir.ends_with("blobproc/spool"));
        assert!(!config.log.debug);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blobproc.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "127.0.0.1:9000"
timeout_secs = 30

[spool]
dir = "/tmp/spool"

[urlmap]
path = "/tmp/urlmap.db"
header = "X-Source-URL"
"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.spool.dir, PathBuf::from("/tmp/spool"));
        assert_eq!(config.urlmap.path, Some(PathBuf::from("/tmp/urlmap.db")));
        assert_eq!(config.urlmap.header, "X-Source-URL");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config: Config = toml::from_str("[server]\ntimeout_secs = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_bind_and_header() {
        let config: Config = toml::from_str("[server]\nbind = \"nowhere\"\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[urlmap]\nheader = \"bad header\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Path::new("/nonexistent/blobproc.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
