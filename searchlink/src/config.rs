//! Client configuration
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! none at all) is valid:
//!
//! ```toml
//! [client]
//! hosts = ["http://es-1:9200", "http://es-2:9200"]
//! randomize_hosts = false
//! username = "elastic"
//! password = "changeme"
//!
//! [client.headers]
//! x-tenant = "search"
//!
//! [bulk]
//! chunk_size = 1000
//! max_retries = 3
//!
//! [scan]
//! preserve_order = true
//! ```

use crate::bulk::BulkOptions;
use crate::error::{Error, Result};
use crate::pool::SelectorKind;
use crate::scan::ScanOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Node pool and HTTP transport settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base URLs of the cluster nodes
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Shuffle the node order once when the pool is built
    #[serde(default = "default_true")]
    pub randomize_hosts: bool,

    /// Selection policy among live nodes
    #[serde(default)]
    pub selector: SelectorKind,

    /// Base penalty for a node's first failure
    #[serde(default = "default_dead_timeout")]
    pub dead_timeout_secs: u64,

    /// Upper bound on the penalty after repeated failures
    #[serde(default = "default_max_dead_timeout")]
    pub max_dead_timeout_secs: u64,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Connection-level retries on another node
    #[serde(default = "default_transport_retries")]
    pub max_retries: u32,

    /// Treat request timeouts like connection failures (retry elsewhere)
    #[serde(default)]
    pub retry_on_timeout: bool,

    /// User for HTTP basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Encoded API key, sent as `Authorization: ApiKey <key>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sent as `X-Opaque-Id` to tag requests in server logs and tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque_id: Option<String>,

    /// Extra headers sent with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_dead_timeout() -> u64 {
    60
}

fn default_max_dead_timeout() -> u64 {
    1800
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_transport_retries() -> u32 {
    3
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            randomize_hosts: true,
            selector: SelectorKind::default(),
            dead_timeout_secs: default_dead_timeout(),
            max_dead_timeout_secs: default_max_dead_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_transport_retries(),
            retry_on_timeout: false,
            username: None,
            password: None,
            api_key: None,
            opaque_id: None,
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Get the base dead timeout as Duration
    pub fn dead_timeout(&self) -> Duration {
        Duration::from_secs(self.dead_timeout_secs)
    }

    /// Get the dead timeout cap as Duration
    pub fn max_dead_timeout(&self) -> Duration {
        Duration::from_secs(self.max_dead_timeout_secs)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Bulk streaming settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// Retries for items rejected with 429 (0 disables retrying)
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_true")]
    pub raise_on_error: bool,

    #[serde(default = "default_true")]
    pub raise_on_exception: bool,
}

fn default_chunk_size() -> usize {
    500
}

fn default_max_chunk_bytes() -> usize {
    100 * 1024 * 1024 // 100MB
}

fn default_initial_backoff() -> u64 {
    2_000
}

fn default_max_backoff() -> u64 {
    600_000
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunk_bytes: default_max_chunk_bytes(),
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            raise_on_error: true,
            raise_on_exception: true,
        }
    }
}

impl BulkConfig {
    /// Convert into options for [`streaming_bulk`](crate::bulk::streaming_bulk)
    pub fn to_options(&self) -> BulkOptions {
        BulkOptions {
            chunk_size: self.chunk_size,
            max_chunk_bytes: self.max_chunk_bytes,
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            raise_on_error: self.raise_on_error,
            raise_on_exception: self.raise_on_exception,
            ..BulkOptions::default()
        }
    }
}

/// Scroll scan settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Scroll keep-alive, in the server's time unit syntax
    #[serde(default = "default_scroll")]
    pub scroll: String,

    /// Hits per page
    #[serde(default = "default_scan_size")]
    pub size: usize,

    #[serde(default)]
    pub preserve_order: bool,

    #[serde(default = "default_true")]
    pub raise_on_error: bool,

    #[serde(default = "default_true")]
    pub clear_scroll: bool,
}

fn default_scroll() -> String {
    "5m".to_string()
}

fn default_scan_size() -> usize {
    1000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scroll: default_scroll(),
            size: default_scan_size(),
            preserve_order: false,
            raise_on_error: true,
            clear_scroll: true,
        }
    }
}

impl ScanConfig {
    /// Convert into options for [`scan`](crate::scan::scan) over `index`
    pub fn to_options(&self, index: impl Into<String>) -> ScanOptions {
        ScanOptions {
            index: index.into(),
            scroll: self.scroll.clone(),
            size: self.size,
            preserve_order: self.preserve_order,
            raise_on_error: self.raise_on_error,
            clear_scroll: self.clear_scroll,
            ..ScanOptions::default()
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file, or fall back to defaults when it is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that can never work
    pub fn validate(&self) -> Result<()> {
        if self.client.hosts.is_empty() {
            return Err(Error::Config("client.hosts must not be empty".into()));
        }
        if self.client.username.is_some() && self.client.api_key.is_some() {
            return Err(Error::Config(
                "client.username and client.api_key are mutually exclusive".into(),
            ));
        }
        if self.client.password.is_some() && self.client.username.is_none() {
            return Err(Error::Config("client.password requires client.username".into()));
        }
        if self.bulk.chunk_size == 0 {
            return Err(Error::Config("bulk.chunk_size must be at least 1".into()));
        }
        if self.scan.size == 0 {
            return Err(Error::Config("scan.size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.client.hosts, vec!["http://localhost:9200"]);
        assert!(config.client.randomize_hosts);
        assert_eq!(config.client.selector, SelectorKind::RoundRobin);
        assert_eq!(config.client.dead_timeout(), Duration::from_secs(60));
        assert_eq!(config.client.max_dead_timeout(), Duration::from_secs(1800));
        assert_eq!(config.bulk.chunk_size, 500);
        assert_eq!(config.bulk.max_chunk_bytes, 100 * 1024 * 1024);
        assert_eq!(config.bulk.max_retries, 0);
        assert!(config.bulk.raise_on_error);
        assert_eq!(config.scan.scroll, "5m");
        assert!(config.scan.clear_scroll);
        assert!(!config.scan.preserve_order);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [client]
            hosts = ["http://a:9200", "http://b:9200"]
            randomize_hosts = false
            selector = "random"

            [bulk]
            max_retries = 3
            initial_backoff_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.client.hosts.len(), 2);
        assert!(!config.client.randomize_hosts);
        assert_eq!(config.client.selector, SelectorKind::Random);
        assert_eq!(config.client.max_retries, 3);
        assert_eq!(config.bulk.chunk_size, 500);

        let opts = config.bulk.to_options();
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.initial_backoff, Duration::ZERO);
        assert_eq!(opts.max_backoff, Duration::from_secs(600));
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("conf/searchlink.toml");

        let mut config = Config::default();
        config.client.hosts = vec!["http://node-7:9200".to_string()];
        config.scan.size = 250;
        config.scan.preserve_order = true;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.client.hosts, vec!["http://node-7:9200"]);
        assert_eq!(loaded.scan.size, 250);

        let opts = loaded.scan.to_options("logs");
        assert_eq!(opts.index, "logs");
        assert!(opts.preserve_order);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp = tempdir().unwrap();
        let config = Config::load_or_default(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.bulk.chunk_size, 500);
    }

    #[test]
    fn test_auth_and_headers_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [client]
            api_key = "Zm9vOmJhcg=="
            opaque_id = "nightly-reindex"

            [client.headers]
            x-tenant = "search"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.client.api_key.as_deref(), Some("Zm9vOmJhcg=="));
        assert_eq!(config.client.opaque_id.as_deref(), Some("nightly-reindex"));
        assert_eq!(
            config.client.headers.get("x-tenant").map(String::as_str),
            Some("search")
        );
    }

    #[test]
    fn test_conflicting_credentials_are_rejected() {
        let mut config = Config::default();
        config.client.username = Some("elastic".into());
        config.client.api_key = Some("key".into());
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.client.password = Some("changeme".into());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_hosts_is_config_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[client]\nhosts = []\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
