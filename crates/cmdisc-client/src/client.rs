use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cmdisc_common::api::{
    ApiClusterList, ApiConfigList, ApiEventQueryResult, ApiRoleConfigList, ApiRoleList,
    ApiServiceConfig, ApiServiceList, ClusterManagerApi, DataView,
};
use cmdisc_common::config::HttpClientConfig;
use cmdisc_common::error::{DiscoveryError, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{ACCEPT, AUTHORIZATION};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Characters left unescaped in path segments and query values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// HTTP client for one cluster manager endpoint.
///
/// Talks plain HTTP with JSON bodies and optional basic authentication.
/// A 404 or an empty body is reported as `Ok(None)`; any other non-success
/// status becomes [`DiscoveryError::Api`].
pub struct HttpApiClient {
    address: String,
    base_url: String,
    authorization: Option<String>,
    request_timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpApiClient {
    /// Creates a client for the management endpoint at `address`.
    ///
    /// # Arguments
    /// * `address` - Endpoint base address (e.g., "http://cm-host:7180")
    /// * `config` - API version and timeouts
    ///
    /// # Returns
    /// - `Ok(HttpApiClient)` - Client ready for use; no connection is made yet
    /// - `Err(DiscoveryError)` - The address is blank or not plain HTTP
    pub fn new(address: impl Into<String>, config: &HttpClientConfig) -> Result<Self> {
        let address = normalize_address(&address.into())?;
        let base_url = format!("{}/api/{}", address, config.api_version.trim_matches('/'));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            address,
            base_url,
            authorization: None,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            client,
        })
    }

    /// Sends HTTP basic credentials with every request.
    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{}:{}", user, password));
        self.authorization = Some(format!("Basic {}", token));
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&utf8_percent_encode(segment, COMPONENT).to_string());
        }
        for (i, (name, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(name);
            url.push('=');
            url.push_str(&utf8_percent_encode(value, COMPONENT).to_string());
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(&url)
            .header(ACCEPT, "application/json");
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| DiscoveryError::Transport(format!("Failed to build request: {}", e)))?;

        debug!("GET {}", url);

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| DiscoveryError::Transport(format!("HTTP request failed: {}", e)))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| DiscoveryError::Transport(format!("Failed to read response: {}", e)))?
                .to_bytes();
            Ok::<_, DiscoveryError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| DiscoveryError::Timeout(self.request_timeout.as_millis() as u64))??;

        if status == StatusCode::NOT_FOUND {
            debug!("{} returned 404, treating as no data", url);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DiscoveryError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&body)?))
    }
}

/// Trims the address, adds a missing `http://` scheme and drops trailing
/// slashes.
fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(DiscoveryError::MissingAddress);
    }
    if address.starts_with("https://") {
        return Err(DiscoveryError::InvalidConfig(format!(
            "TLS endpoints are not supported: {}",
            address
        )));
    }
    if address.starts_with("http://") {
        Ok(address.to_string())
    } else if address.contains("://") {
        Err(DiscoveryError::InvalidConfig(format!(
            "Unsupported address scheme: {}",
            address
        )))
    } else {
        Ok(format!("http://{}", address))
    }
}

#[async_trait]
impl ClusterManagerApi for HttpApiClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn read_clusters(&self, view: DataView) -> Result<Option<ApiClusterList>> {
        let url = self.url(
            &["clusters"],
            &[("clusterType", "any".to_string()), ("view", view.as_str().to_string())],
        );
        self.get_json(url).await
    }

    async fn read_services(&self, cluster: &str, view: DataView) -> Result<Option<ApiServiceList>> {
        let url = self.url(
            &["clusters", cluster, "services"],
            &[("view", view.as_str().to_string())],
        );
        self.get_json(url).await
    }

    async fn read_service_config(
        &self,
        cluster: &str,
        service: &str,
        view: DataView,
    ) -> Result<Option<ApiServiceConfig>> {
        let url = self.url(
            &["clusters", cluster, "services", service, "config"],
            &[("view", view.as_str().to_string())],
        );
        self.get_json(url).await
    }

    async fn read_roles(
        &self,
        cluster: &str,
        service: &str,
        filter: &str,
        view: DataView,
    ) -> Result<Option<ApiRoleList>> {
        let url = self.url(
            &["clusters", cluster, "services", service, "roles"],
            &[("filter", filter.to_string()), ("view", view.as_str().to_string())],
        );
        self.get_json(url).await
    }

    async fn read_role_config(
        &self,
        cluster: &str,
        role: &str,
        service: &str,
        view: DataView,
    ) -> Result<Option<ApiConfigList>> {
        let url = self.url(
            &["clusters", cluster, "services", service, "roles", role, "config"],
            &[("view", view.as_str().to_string())],
        );
        self.get_json(url).await
    }

    async fn read_roles_config(
        &self,
        cluster: &str,
        service: &str,
        limit: u64,
        offset: u64,
        view: DataView,
    ) -> Result<Option<ApiRoleConfigList>> {
        let url = self.url(
            &["clusters", cluster, "services", service, "roles", "config"],
            &[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("view", view.as_str().to_string()),
            ],
        );
        self.get_json(url).await
    }

    async fn read_events(
        &self,
        max_results: Option<u64>,
        query: &str,
        offset: u64,
    ) -> Result<Option<ApiEventQueryResult>> {
        let mut params = Vec::with_capacity(3);
        if let Some(max_results) = max_results {
            params.push(("maxResults", max_results.to_string()));
        }
        params.push(("query", query.to_string()));
        params.push(("resultOffset", offset.to_string()));
        let url = self.url(&["events"], &params);
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(address: &str) -> HttpApiClient {
        HttpApiClient::new(address, &HttpClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_address_normalization() {
        assert_eq!(client("http://cm:7180/").address(), "http://cm:7180");
        assert_eq!(client("cm:7180").address(), "http://cm:7180");
        assert_eq!(client(" http://cm:7180 ").base_url(), "http://cm:7180/api/v32");
    }

    #[test]
    fn test_rejects_blank_and_tls_addresses() {
        let config = HttpClientConfig::default();
        assert!(matches!(
            HttpApiClient::new("  ", &config),
            Err(DiscoveryError::MissingAddress)
        ));
        assert!(matches!(
            HttpApiClient::new("https://cm:7183", &config),
            Err(DiscoveryError::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpApiClient::new("ftp://cm", &config),
            Err(DiscoveryError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_url_encodes_segments_and_query() {
        let client = client("http://cm:7180");
        let url = client.url(
            &["clusters", "Cluster 1", "services"],
            &[("query", "category==AUDIT_EVENT;attributes.cluster==\"c\"".to_string())],
        );
        assert_eq!(
            url,
            "http://cm:7180/api/v32/clusters/Cluster%201/services?query=category%3D%3DAUDIT_EVENT%3Battributes.cluster%3D%3D%22c%22"
        );
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let client = client("http://cm:7180").with_basic_auth("admin", "secret");
        assert_eq!(
            client.authorization.as_deref(),
            Some("Basic YWRtaW46c2VjcmV0")
        );
    }
}
