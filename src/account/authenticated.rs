use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::account::CredentialStore;
use crate::app::NetworkError;
use crate::client::{HttpClient, HttpRequest, HttpResponse};
use crate::config::AccountConfig;
use crate::domain::Credential;

/// Source of the current time, injectable for expiry tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: String,
}

/// Transport wrapper that signs requests with the account's bearer token.
///
/// - no stored credential: answers 401 without touching the network
/// - credential near expiry: refreshes once, then sends the request
/// - 401 from the server: forgets the credential and returns the 401
pub struct AuthenticatedClient {
    inner: Arc<dyn HttpClient>,
    credentials: Arc<dyn CredentialStore>,
    account: AccountConfig,
    clock: Clock,
}

impl AuthenticatedClient {
    pub fn new(
        inner: Arc<dyn HttpClient>,
        credentials: Arc<dyn CredentialStore>,
        account: AccountConfig,
    ) -> Self {
        Self::with_clock(inner, credentials, account, system_clock())
    }

    pub fn with_clock(
        inner: Arc<dyn HttpClient>,
        credentials: Arc<dyn CredentialStore>,
        account: AccountConfig,
        clock: Clock,
    ) -> Self {
        Self {
            inner,
            credentials,
            account,
            clock,
        }
    }

    fn credential(&self) -> Option<Credential> {
        match self.credentials.credential_for(&self.account.account_id) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(account = %self.account.account_id, error = %e, "Failed to read credentials");
                None
            }
        }
    }

    fn forget(&self, credential: &Credential) {
        info!(account = %credential.account_id, "Discarding invalid credential");
        if let Err(e) = self.credentials.delete(credential) {
            warn!(account = %credential.account_id, error = %e, "Failed to delete credential");
        }
    }

    /// Exchange the refresh token for a new credential.
    ///
    /// `Ok(None)` means the token endpoint refused; the stale credential has
    /// been deleted. Transport failures propagate unchanged.
    async fn refresh(&self, stale: &Credential) -> Result<Option<Credential>, NetworkError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.account.client_id)
            .append_pair("client_secret", &self.account.client_secret)
            .append_pair("grant_type", "refresh")
            .append_pair("refresh_token", &stale.refresh)
            .finish();

        let request = HttpRequest::post(&self.account.token_url, body.into_bytes())
            .with_header("Content-Type", "application/x-www-form-urlencoded");
        let response = self.inner.request(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Token refresh rejected");
            self.forget(stale);
            return Ok(None);
        }

        let token: TokenResponse = match serde_json::from_slice(&response.body) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Undecodable token refresh response");
                self.forget(stale);
                return Ok(None);
            }
        };

        let refreshed = Credential {
            access: token.access_token,
            expiration: (self.clock)() + Duration::seconds(token.expires_in),
            refresh: token.refresh_token,
            account_id: stale.account_id.clone(),
            account_type: stale.account_type,
        };
        if let Err(e) = self.credentials.store(&refreshed) {
            warn!(account = %refreshed.account_id, error = %e, "Failed to store refreshed credential");
        }
        debug!(account = %refreshed.account_id, "Credential refreshed");
        Ok(Some(refreshed))
    }
}

#[async_trait]
impl HttpClient for AuthenticatedClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let Some(mut credential) = self.credential() else {
            debug!(account = %self.account.account_id, "No credential, not sending request");
            return Ok(HttpResponse::unauthorized());
        };

        if credential.needs_refresh((self.clock)()) {
            credential = match self.refresh(&credential).await? {
                Some(refreshed) => refreshed,
                None => return Ok(HttpResponse::unauthorized()),
            };
        }

        let request = request.with_header("Authorization", format!("Bearer {}", credential.access));
        let response = self.inner.request(request).await?;

        if response.status == 401 {
            self.forget(&credential);
        }
        Ok(response)
    }
}
