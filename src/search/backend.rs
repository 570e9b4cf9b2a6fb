//! Search backend client (Elasticsearch REST API)

use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};

/// Cluster status as reported by `_cluster/health`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClusterStatus {
    Green,
    Yellow,
    Red,
}

/// Subset of the cluster health payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub status: ClusterStatus,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub number_of_nodes: u32,
}

/// Operations the connection manager issues against the backend
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn ping(&self) -> SearchResult<()>;

    async fn cluster_health(&self) -> SearchResult<ClusterHealth>;

    /// Run a `_search` body against `index`, returning the raw response
    async fn search(&self, index: &str, body: &Value) -> SearchResult<Value>;

    /// Run a `_count` body against `index`
    async fn count(&self, index: &str, body: &Value) -> SearchResult<u64>;
}

/// Backend HTTP settings
#[derive(Clone)]
pub struct HttpBackendSettings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl fmt::Debug for HttpBackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackendSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// reqwest client for the backend's REST API
#[derive(Clone)]
pub struct HttpSearchBackend {
    client: Client,
    settings: HttpBackendSettings,
}

impl HttpSearchBackend {
    pub fn new(settings: HttpBackendSettings) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| {
                SearchError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            settings: HttpBackendSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.settings.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.settings.username {
            Some(user) => builder.basic_auth(user, self.settings.password.as_ref()),
            None => builder,
        }
    }

    async fn send_json(&self, builder: RequestBuilder) -> SearchResult<Value> {
        let response = builder.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(classify_transport_error)?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(SearchError::from);
        }

        Err(classify_error_response(status, &body))
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn ping(&self) -> SearchResult<()> {
        let response = self
            .request(Method::HEAD, "/")
            .send()
            .await
            .map_err(classify_transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_error_response(response.status(), ""))
        }
    }

    async fn cluster_health(&self) -> SearchResult<ClusterHealth> {
        let raw = self.send_json(self.request(Method::GET, "_cluster/health")).await?;
        serde_json::from_value(raw).map_err(SearchError::from)
    }

    async fn search(&self, index: &str, body: &Value) -> SearchResult<Value> {
        debug!(index = %index, "POST _search");
        self.send_json(self.request(Method::POST, &format!("{}/_search", index)).json(body))
            .await
    }

    async fn count(&self, index: &str, body: &Value) -> SearchResult<u64> {
        let raw = self
            .send_json(self.request(Method::POST, &format!("{}/_count", index)).json(body))
            .await?;
        raw["count"].as_u64().ok_or_else(|| {
            SearchError::Serialization("count response is missing `count`".to_string())
        })
    }
}

/// Only failures on the wire are retryable. A request that could not be
/// built or a body that could not be decoded will fail the same way again.
fn classify_transport_error(err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Connection(format!("request timed out: {}", err))
    } else if err.is_connect() {
        SearchError::Connection(format!("connect failed: {}", err))
    } else if err.is_builder() {
        SearchError::InvalidConfiguration(format!("invalid backend request: {}", err))
    } else if err.is_decode() {
        SearchError::Serialization(format!("undecodable backend response: {}", err))
    } else if err.is_request() || err.is_body() {
        SearchError::Connection(err.to_string())
    } else {
        SearchError::BackendQuery {
            error_type: "transport_error".to_string(),
            reason: err.to_string(),
            status: err.status().map(|s| s.as_u16()).unwrap_or(502),
        }
    }
}

/// Map a non-2xx response to the error taxonomy.
///
/// Overload and gateway statuses are treated as transient. Everything else
/// carries the backend's own error type and reason and is final.
pub fn classify_error_response(status: StatusCode, body: &str) -> SearchError {
    if matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    ) {
        warn!(status = status.as_u16(), "Backend reported transient failure");
        return SearchError::Connection(format!("backend returned {}", status));
    }

    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &parsed["error"];
    let root = &error["root_cause"][0];

    let error_type = error["type"]
        .as_str()
        .or_else(|| root["type"].as_str())
        .unwrap_or("http_error")
        .to_string();
    let reason = error["reason"]
        .as_str()
        .or_else(|| root["reason"].as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    SearchError::BackendQuery {
        error_type,
        reason,
        status: status.as_u16(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_query_error_body() {
        let body = r#"{
            "error": {
                "root_cause": [{ "type": "parsing_exception", "reason": "unknown query [mtch]" }],
                "type": "parsing_exception",
                "reason": "unknown query [mtch]"
            },
            "status": 400
        }"#;

        match classify_error_response(StatusCode::BAD_REQUEST, body) {
            SearchError::BackendQuery {
                error_type,
                reason,
                status,
            } => {
                assert_eq!(error_type, "parsing_exception");
                assert_eq!(reason, "unknown query [mtch]");
                assert_eq!(status, 400);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_builder_errors_are_not_retryable() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        assert!(err.is_builder());

        let classified = classify_transport_error(err);
        assert!(matches!(classified, SearchError::InvalidConfiguration(_)));
        assert!(!classified.is_retryable());
    }

    #[test]
    fn test_classify_transient_statuses() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            assert!(classify_error_response(status, "").is_retryable());
        }
    }

    #[test]
    fn test_classify_unparseable_body() {
        let err = classify_error_response(StatusCode::NOT_FOUND, "not json");
        assert!(!err.is_retryable());
        assert!(matches!(
            err,
            SearchError::BackendQuery { ref error_type, status: 404, .. } if error_type == "http_error"
        ));
    }

    #[test]
    fn test_cluster_status_parse() {
        let health: ClusterHealth =
            serde_json::from_str(r#"{"status":"yellow","cluster_name":"c","number_of_nodes":3}"#)
                .unwrap();
        assert_eq!(health.status, ClusterStatus::Yellow);
        assert_eq!(health.status.to_string(), "yellow");
    }

    #[test]
    fn test_settings_debug_hides_password() {
        let settings = HttpBackendSettings {
            base_url: "http://localhost:9200".into(),
            username: Some("elastic".into()),
            password: Some("secret".into()),
            request_timeout: Duration::from_secs(5),
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("secret"));
    }
}
