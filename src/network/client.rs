//! HTTP client for making requests to hosted code-search APIs

use crate::config::OutgoingSettings;
use crate::engines::{EngineRequest, EngineResponse};
use crate::error::Result;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper shared by the hosted backends
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .pool_max_idle_per_host(settings.pool_maxsize)
            .gzip(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        let client = builder.build()?;
        let user_agent = settings
            .useragent
            .clone()
            .unwrap_or_else(|| format!("codesearch-rs/{}", crate::VERSION));

        Ok(Self { client, user_agent })
    }

    /// Execute a backend request
    pub async fn execute(&self, request: EngineRequest) -> Result<EngineResponse> {
        debug!("GET {} {:?}", request.url, request.params);

        let mut req_builder = self.client.get(&request.url);

        // reqwest appends repeated headers, so a default is only sent when
        // the request does not set its own
        let defaults = [
            ("User-Agent", self.user_agent.as_str()),
            ("Accept", "application/json"),
        ];
        for (key, value) in defaults {
            if !request.headers.keys().any(|k| k.eq_ignore_ascii_case(key)) {
                req_builder = req_builder.header(key, value);
            }
        }
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        let response = req_builder.send().await?;

        Self::parse_response(response).await
    }

    /// Parse response into EngineResponse
    async fn parse_response(response: Response) -> Result<EngineResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let text = response.text().await?;

        Ok(EngineResponse {
            status,
            headers,
            text,
            url,
        })
    }

    /// Get current user agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
        assert!(client.unwrap().user_agent().starts_with("codesearch-rs/"));
    }

    #[tokio::test]
    async fn test_execute_sends_headers_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "needle"))
            .and(header("private-token", "t0k"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Next-Page", "2")
                    .set_body_string("[]"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let request = EngineRequest::get(format!("{}/search", server.uri()))
            .header("PRIVATE-TOKEN", "t0k")
            .param("q", "needle");
        let response = client.execute(request).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.header("x-next-page"), Some("2"));
        assert_eq!(response.text, "[]");
    }

    #[tokio::test]
    async fn test_custom_accept_replaces_default() {
        let server = MockServer::start().await;
        // exact match on the full list of received values
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(header("accept", "application/vnd.github.text-match+json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let custom = EngineRequest::get(format!("{}/search/code", server.uri()))
            .header("Accept", "application/vnd.github.text-match+json");
        assert!(client.execute(custom).await.unwrap().is_success());

        let plain = EngineRequest::get(format!("{}/plain", server.uri()));
        assert!(client.execute(plain).await.unwrap().is_success());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }
}
