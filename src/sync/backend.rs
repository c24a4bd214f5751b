use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::app::BackendError;
use crate::client::{HttpClient, HttpRequest};

/// Remote service that tracks read state, keyed by article link.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn mark_read(&self, articles: HashMap<String, bool>) -> Result<(), BackendError>;
}

#[derive(Serialize)]
struct MarkReadBody<'a> {
    articles: &'a HashMap<String, bool>,
}

/// [`Backend`] speaking JSON over any [`HttpClient`], normally an
/// [`AuthenticatedClient`](crate::account::AuthenticatedClient).
pub struct HttpBackend {
    client: Arc<dyn HttpClient>,
    api_base: String,
}

impl HttpBackend {
    pub fn new(client: Arc<dyn HttpClient>, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/articles/read", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn mark_read(&self, articles: HashMap<String, bool>) -> Result<(), BackendError> {
        let body = serde_json::to_vec(&MarkReadBody {
            articles: &articles,
        })
        .map_err(|_| BackendError::Unknown)?;

        let request = HttpRequest::post(self.endpoint(), body)
            .with_header("Content-Type", "application/json");

        let response = self
            .client
            .request(request)
            .await
            .map_err(BackendError::Network)?;

        if response.is_success() {
            debug!(count = articles.len(), "Pushed read state");
            Ok(())
        } else {
            debug!(status = response.status, "Backend rejected read state");
            Err(BackendError::Unknown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::NetworkError;
    use crate::client::{HttpResponse, Method};
    use crate::testing::ScriptedClient;

    const ENDPOINT: &str = "https://api.example.com/v1/articles/read";

    #[tokio::test]
    async fn test_posts_json_body() {
        let client = Arc::new(ScriptedClient::new());
        client.respond(ENDPOINT, Ok(HttpResponse::new(204, Vec::new())));
        let backend = HttpBackend::new(client.clone(), "https://api.example.com/v1/");

        backend
            .mark_read(HashMap::from([("https://example.com/1".to_string(), true)]))
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].header("content-type"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"articles": {"https://example.com/1": true}}));
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let client = Arc::new(ScriptedClient::new());
        client.respond(ENDPOINT, Err(NetworkError::InternetDown));
        let backend = HttpBackend::new(client, "https://api.example.com/v1");

        assert_eq!(
            backend.mark_read(HashMap::new()).await,
            Err(BackendError::Network(NetworkError::InternetDown))
        );
    }

    #[tokio::test]
    async fn test_rejected_status_is_unknown() {
        let client = Arc::new(ScriptedClient::new());
        client.respond(ENDPOINT, Ok(HttpResponse::unauthorized()));
        let backend = HttpBackend::new(client, "https://api.example.com/v1");

        assert_eq!(backend.mark_read(HashMap::new()).await, Err(BackendError::Unknown));
    }
}
