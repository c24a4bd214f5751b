use std::collections::HashMap;
use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::app::NetworkError;
use crate::client::{HttpClient, HttpRequest, HttpResponse, Method};

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("tethys/", env!("CARGO_PKG_VERSION"));

pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::with_options(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_USER_AGENT)
    }

    pub fn with_options(timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|e| classify(&e))?.to_vec();

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}

/// Map a reqwest failure onto the transport error taxonomy.
fn classify(error: &reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        return NetworkError::TimedOut;
    }
    if error.is_builder() {
        return NetworkError::Unknown;
    }
    if error.is_decode() || error.is_body() {
        return NetworkError::BadResponse;
    }

    let chain = source_chain(error).to_ascii_lowercase();
    if chain.contains("dns error") || chain.contains("failed to lookup address") {
        NetworkError::Dns
    } else if chain.contains("network is unreachable") || chain.contains("no route to host") {
        NetworkError::InternetDown
    } else if chain.contains("connection reset") || chain.contains("broken pipe") {
        NetworkError::TimedOut
    } else if error.is_connect() {
        NetworkError::ServerNotFound
    } else {
        NetworkError::Unknown
    }
}

fn source_chain(error: &reqwest::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_unknown() {
        let client = ReqwestClient::new();
        let result = client.request(HttpRequest::get("not a url")).await;
        assert_eq!(result, Err(NetworkError::Unknown));
    }

    #[tokio::test]
    async fn test_refused_connection_is_server_not_found() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ReqwestClient::new();
        let result = client
            .request(HttpRequest::get(format!("http://127.0.0.1:{}/feed", port)))
            .await;
        assert_eq!(result, Err(NetworkError::ServerNotFound));
    }
}
