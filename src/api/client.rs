//! API client for the CareBook backend.
//!
//! This module provides the `ApiClient` for the token, account, and
//! directory endpoints. Protected requests attach JWT bearer auth, retry
//! politely on rate limits, and run the 401 refresh protocol: one refresh,
//! one replay, never more, with concurrent 401s collapsed onto a single
//! refresh call through the vault's gate.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::store::TokenPair;
use crate::auth::vault::{RefreshDisposition, TokenVault};
use crate::models::{
    DoctorQuery, DoctorSummary, RefreshRequest, RefreshResponse, RegisterRequest, SendOtpRequest,
    SendOtpResponse, TokenRequest, UserProfile, VerifyOtpRequest, VerifyOtpResponse,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for the startup probe and token refresh calls in seconds.
/// Both sit on the interactive path, so they fail faster than data fetches.
const AUTH_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the CareBook backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    vault: Arc<TokenVault>,
    auth_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, vault: Arc<TokenVault>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            vault,
            auth_timeout: Duration::from_secs(AUTH_TIMEOUT_SECS),
        })
    }

    #[cfg(test)]
    fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    // ===== Token Endpoints =====

    /// Exchange credentials for a token pair. A 401 here means the
    /// credentials were wrong.
    pub async fn obtain_token(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .client
            .post(self.url("/token/"))
            .json(&TokenRequest { email, password })
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn try_refresh(&self, refresh: &str) -> Result<RefreshResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/token/refresh/"))
            .timeout(self.auth_timeout)
            .json(&RefreshRequest { refresh })
            .send()
            .await?;
        Self::decode(response).await
    }

    /// POST the refresh token, retrying exactly once on transport failure.
    async fn post_refresh(&self, refresh: &str) -> Result<RefreshResponse, ApiError> {
        match self.try_refresh(refresh).await {
            Err(ApiError::Network(e)) => {
                warn!(error = %e, "Token refresh did not reach the server; retrying once");
                self.try_refresh(refresh).await
            }
            other => other,
        }
    }

    /// Run the refresh protocol after a request came back 401.
    ///
    /// `observed` is the vault generation whose access token produced the
    /// 401. Concurrent callers collapse onto one refresh: the first through
    /// the gate performs it, the rest reuse the rotated token or fail
    /// together if the session was revoked in the meantime.
    ///
    /// A 4xx from the refresh endpoint is final: the vault and the token
    /// store are cleared and a `LoginRequired` event is emitted. Transport
    /// failures surface as-is and leave the stored tokens alone.
    pub async fn refresh_after_unauthorized(&self, observed: u64) -> Result<String, ApiError> {
        let _gate = self.vault.lock_refresh().await;
        match self.vault.disposition(observed) {
            RefreshDisposition::Reuse(access) => {
                debug!("Another request already refreshed the token");
                Ok(access)
            }
            RefreshDisposition::SessionGone => Err(ApiError::Unauthorized),
            RefreshDisposition::Refresh(refresh) => match self.post_refresh(&refresh).await {
                Ok(rotated) => {
                    let access = rotated.access.clone();
                    self.vault.rotate(rotated.access, rotated.refresh);
                    Ok(access)
                }
                Err(e) if e.is_auth_rejection() => {
                    warn!("Refresh token rejected; revoking the session");
                    self.vault
                        .revoke("Your session has expired. Please log in again.");
                    Err(ApiError::Unauthorized)
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed without a server verdict");
                    Err(e)
                }
            },
        }
    }

    // ===== Account Endpoints =====

    /// Validate the held access token against the health-check endpoint.
    /// This never triggers a refresh; the session service decides what a
    /// 401 here means.
    pub async fn health_check(&self) -> Result<(), ApiError> {
        let (token, _) = self.vault.bearer();
        let mut request = self
            .client
            .get(self.url("/accounts/health-check/"))
            .timeout(self.auth_timeout);
        if let Some(ref token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    pub async fn send_otp(&self, request: &SendOtpRequest) -> Result<SendOtpResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/accounts/send-otp/"))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn verify_otp(&self, request: &VerifyOtpRequest) -> Result<VerifyOtpResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/accounts/verify-otp/"))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Create the account. The server validates the OTP as part of the
    /// request; field errors come back as a 400 map.
    pub async fn register_with_otp(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/accounts/register-with-otp/"))
            .json(request)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Protected Endpoints =====

    /// GET a protected endpoint: bearer auth, the rate-limit backoff loop,
    /// and the refresh-once/replay-once 401 protocol.
    async fn get_protected<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let (token, observed) = self.vault.bearer();
        let response = self.send_get(path, query, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        debug!(path, "Request came back 401; running token refresh");
        let access = self.refresh_after_unauthorized(observed).await?;

        let response = self.send_get(path, query, Some(&access)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // The request was already replayed once; a second 401 is final.
            return Err(ApiError::Unauthorized);
        }
        Self::decode(response).await
    }

    /// Send a GET, backing off and retrying on 429.
    async fn send_get(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self.client.get(self.url(path));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(path, retry = retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
    }

    /// Fetch the signed-in user's profile.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.get_protected("/accounts/me/", &[]).await
    }

    /// Fetch the verified doctor directory. The endpoint is public, but a
    /// held token is still attached - the server rejects stale tokens even
    /// on public routes.
    pub async fn fetch_doctors(&self, query: &DoctorQuery) -> Result<Vec<DoctorSummary>, ApiError> {
        self.get_protected("/accounts/doctors/", &query.to_query())
            .await
    }
}
