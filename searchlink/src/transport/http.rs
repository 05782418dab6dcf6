//! HTTP client over a pool of cluster nodes
//!
//! Every call asks the pool for a node. Connection failures (and timeouts,
//! when enabled) mark the node dead and retry on the next one; any response
//! the server actually answered marks it live again. Credentials and extra
//! headers from [`ClientConfig`] go out with every request.

use super::{BulkResponse, Params, SearchClient, SearchResponse};
use crate::actions::{encode_ndjson, BulkAction};
use crate::config::ClientConfig;
use crate::error::{Error, Result, TransportError};
use crate::pool::{ConnectionPool, NodeOptions, NodePool, PoolOptions, SingleNodePool};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Gateway statuses that mean "try another node"
const RETRY_ON_STATUS: &[u16] = &[502, 503, 504];

/// A cluster node, identified by its normalized base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    base: String,
}

impl Node {
    /// Parse `http://host:9200`, `https://host/prefix` or a bare `host:9200`
    pub fn parse(host: &str) -> Result<Self> {
        let with_scheme = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| Error::Config(format!("invalid host '{}': {}", host, e)))?;
        if url.host_str().is_none() {
            return Err(Error::Config(format!("host '{}' has no hostname", host)));
        }
        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for an API path starting with `/`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

enum Body {
    Json(Value),
    Ndjson(String),
}

/// Pooled HTTP implementation of [`SearchClient`]
pub struct HttpTransport {
    http: reqwest::Client,
    pool: Arc<dyn NodePool<Node>>,
    max_retries: u32,
    retry_on_timeout: bool,
    basic_auth: Option<(String, Option<String>)>,
    server_version: RwLock<Option<Vec<u32>>>,
}

impl HttpTransport {
    /// Build a transport for `config.hosts`; a single host gets a pool that
    /// never marks it dead
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let nodes = config
            .hosts
            .iter()
            .map(|host| Node::parse(host).map(|node| (node, NodeOptions::new())))
            .collect::<Result<Vec<_>>>()?;

        let pool: Arc<dyn NodePool<Node>> = if nodes.len() == 1 {
            Arc::new(SingleNodePool::new(nodes)?)
        } else {
            Arc::new(ConnectionPool::new(nodes, PoolOptions::from(config))?)
        };

        Self::with_pool(config, pool)
    }

    /// Build a transport over an existing pool
    pub fn with_pool(config: &ClientConfig, pool: Arc<dyn NodePool<Node>>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(default_headers(config)?)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            "HTTP transport ready with {} node(s), {} retries",
            pool.node_count(),
            config.max_retries
        );

        Ok(Self {
            http,
            pool,
            max_retries: config.max_retries,
            retry_on_timeout: config.retry_on_timeout,
            basic_auth: basic_auth(config),
            server_version: RwLock::new(None),
        })
    }

    pub fn pool(&self) -> &Arc<dyn NodePool<Node>> {
        &self.pool
    }

    /// Server version as numeric parts, fetched once and cached
    pub async fn server_version(&self) -> std::result::Result<Vec<u32>, TransportError> {
        let cached = self.server_version.read().clone();
        if let Some(version) = cached {
            return Ok(version);
        }

        let (_, text) = self
            .perform_request(Method::GET, "/", &Params::new(), None, &[])
            .await?;
        let root: Value = decode(&text)?;
        let version = root
            .pointer("/version/number")
            .and_then(Value::as_str)
            .map(parse_version)
            .unwrap_or_default();

        debug!("Cluster reports version {:?}", version);
        *self.server_version.write() = Some(version.clone());
        Ok(version)
    }

    /// Forget the cached server version
    pub fn reset_server_info(&self) {
        *self.server_version.write() = None;
    }

    /// Send one logical request, failing over between nodes.
    ///
    /// Statuses listed in `ignore` count as success.
    async fn perform_request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
        body: Option<Body>,
        ignore: &[u16],
    ) -> std::result::Result<(u16, String), TransportError> {
        let mut attempt = 0;
        loop {
            let node = self
                .pool
                .get_connection()
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            debug!("{} {} on {} (attempt {})", method, path, node, attempt + 1);

            let err = match self.send_once(&node, &method, path, params, body.as_ref()).await {
                Ok((status, text)) if (200..300).contains(&status) || ignore.contains(&status) => {
                    self.pool.mark_live(&node);
                    return Ok((status, text));
                }
                Ok((status, text)) => {
                    let err = status_error(status, &text);
                    if !RETRY_ON_STATUS.contains(&status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) if e.is_timeout() => {
                    let err = TransportError::Timeout(e.to_string());
                    if !self.retry_on_timeout {
                        return Err(err);
                    }
                    err
                }
                Err(e) => TransportError::Connection(e.to_string()),
            };

            warn!("{} {} on {} failed: {}", method, path, node, err);
            self.pool.mark_dead(&node);
            if attempt >= self.max_retries {
                return Err(err);
            }
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        node: &Node,
        method: &Method,
        path: &str,
        params: &Params,
        body: Option<&Body>,
    ) -> reqwest::Result<(u16, String)> {
        let mut request = self
            .http
            .request(method.clone(), node.endpoint(path))
            .query(params);

        if let Some((username, password)) = &self.basic_auth {
            request = request.basic_auth(username, password.as_ref());
        }

        request = match body {
            Some(Body::Json(value)) => request.json(value),
            Some(Body::Ndjson(payload)) => request
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(payload.clone()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl SearchClient for HttpTransport {
    async fn bulk(
        &self,
        index: Option<&str>,
        actions: &[BulkAction],
        params: &Params,
    ) -> std::result::Result<BulkResponse, TransportError> {
        let path = match index {
            Some(index) => format!("/{}/_bulk", index),
            None => "/_bulk".to_string(),
        };
        let payload = encode_ndjson(actions).map_err(|e| TransportError::Decode(e.to_string()))?;
        let (_, text) = self
            .perform_request(Method::POST, &path, params, Some(Body::Ndjson(payload)), &[])
            .await?;
        decode(&text)
    }

    async fn search(
        &self,
        index: &str,
        body: &Value,
        params: &Params,
    ) -> std::result::Result<SearchResponse, TransportError> {
        let path = format!("/{}/_search", index);
        let (_, text) = self
            .perform_request(Method::POST, &path, params, Some(Body::Json(body.clone())), &[])
            .await?;
        decode(&text)
    }

    async fn scroll(
        &self,
        scroll_id: &str,
        scroll: &str,
    ) -> std::result::Result<SearchResponse, TransportError> {
        let body = json!({"scroll": scroll, "scroll_id": scroll_id});
        let (_, text) = self
            .perform_request(
                Method::POST,
                "/_search/scroll",
                &Params::new(),
                Some(Body::Json(body)),
                &[],
            )
            .await?;
        decode(&text)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> std::result::Result<(), TransportError> {
        let body = json!({"scroll_id": [scroll_id]});
        self.perform_request(
            Method::DELETE,
            "/_search/scroll",
            &Params::new(),
            Some(Body::Json(body)),
            &[404],
        )
        .await?;
        Ok(())
    }
}

/// Split a version string into numeric parts; non-numeric parts become 999.
///
/// A string without any `.` yields no parts.
pub fn parse_version(version: &str) -> Vec<u32> {
    if !version.contains('.') {
        return Vec::new();
    }
    version
        .split('.')
        .map(|part| {
            if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse().unwrap_or(999)
            } else {
                999
            }
        })
        .collect()
}

/// Headers sent on every request: API key, opaque id, then the configured extras
fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(key) = &config.api_key {
        let mut value = HeaderValue::from_str(&format!("ApiKey {}", key))
            .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    if let Some(opaque_id) = &config.opaque_id {
        let value = HeaderValue::from_str(opaque_id)
            .map_err(|e| Error::Config(format!("invalid opaque_id: {}", e)))?;
        headers.insert("x-opaque-id", value);
    }
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Basic auth credentials, unless an API key takes the Authorization header
fn basic_auth(config: &ClientConfig) -> Option<(String, Option<String>)> {
    if config.api_key.is_some() {
        return None;
    }
    config
        .username
        .clone()
        .map(|username| (username, config.password.clone()))
}

fn decode<T: DeserializeOwned>(text: &str) -> std::result::Result<T, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Error for a non-success response, keeping the server's error body
fn status_error(status: u16, text: &str) -> TransportError {
    let info: Value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    let message = match info.get("error") {
        Some(Value::Object(error)) => error
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(Value::String(error)) => Some(error.clone()),
        _ => None,
    }
    .unwrap_or_else(|| {
        if text.is_empty() {
            "Unknown".to_string()
        } else {
            text.to_string()
        }
    });

    TransportError::Status {
        status,
        message,
        info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_parse_normalizes_urls() {
        let node = Node::parse("http://localhost:9200/").unwrap();
        assert_eq!(node.to_string(), "http://localhost:9200");
        assert_eq!(node.endpoint("/_bulk"), "http://localhost:9200/_bulk");

        let bare = Node::parse("es-1:9200").unwrap();
        assert_eq!(bare.to_string(), "http://es-1:9200");

        let prefixed = Node::parse("https://proxy.local/es").unwrap();
        assert_eq!(prefixed.endpoint("/_search"), "https://proxy.local/es/_search");
    }

    #[test]
    fn test_node_parse_rejects_garbage() {
        assert!(matches!(Node::parse("http://"), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("7.10.2"), vec![7, 10, 2]);
        assert_eq!(parse_version("8.0.0-SNAPSHOT"), vec![8, 0, 999]);
        assert!(parse_version("8").is_empty());
    }

    #[test]
    fn test_status_error_uses_error_type() {
        let err = status_error(
            400,
            r#"{"error":{"type":"parse_exception","reason":"bad"},"status":400}"#,
        );
        assert_eq!(err.to_string(), "TransportError(400, 'parse_exception')");

        let err = status_error(500, "boom");
        assert_eq!(err.to_string(), "TransportError(500, 'boom')");
        assert_eq!(status_error(404, "").to_string(), "TransportError(404, 'Unknown')");
    }

    #[test]
    fn test_default_headers_from_config() {
        let mut config = ClientConfig {
            api_key: Some("Zm9vOmJhcg==".into()),
            opaque_id: Some("job-1".into()),
            ..Default::default()
        };
        config.headers.insert("X-Tenant".into(), "search".into());

        let headers = default_headers(&config).unwrap();
        assert_eq!(headers[AUTHORIZATION], "ApiKey Zm9vOmJhcg==");
        assert_eq!(headers["x-opaque-id"], "job-1");
        assert_eq!(headers["x-tenant"], "search");
    }

    #[test]
    fn test_bad_header_is_config_error() {
        let mut config = ClientConfig::default();
        config.headers.insert("bad header".into(), "x".into());
        assert!(matches!(default_headers(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_api_key_takes_precedence_over_basic_auth() {
        let config = ClientConfig {
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            ..Default::default()
        };
        assert_eq!(
            basic_auth(&config),
            Some(("elastic".to_string(), Some("changeme".to_string())))
        );

        let config = ClientConfig {
            api_key: Some("key".into()),
            ..config
        };
        assert_eq!(basic_auth(&config), None);
    }

    #[test]
    fn test_single_host_uses_single_node_pool() {
        let config = ClientConfig {
            hosts: vec!["http://localhost:9200".into()],
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.pool().node_count(), 1);

        let config = ClientConfig {
            hosts: vec!["http://a:9200".into(), "http://b:9200".into()],
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.pool().node_count(), 2);
    }
}
