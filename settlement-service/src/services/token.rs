//! Bearer token acquisition for gateway calls.
//!
//! The token provider is an injected capability so handlers can be tested
//! against fakes and the caching strategy can change without touching callers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::services::pesapal::{GatewayError, PesapalClient};

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for the next gateway call.
    async fn bearer_token(&self) -> Result<String, GatewayError>;

    /// Drop any cached token, forcing a fresh exchange on the next call.
    /// Callers invoke this when the gateway answers 401 with a token that was
    /// presumed valid.
    async fn invalidate(&self);
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Time-boxed token cache over the gateway's `RequestToken` call, refreshed
/// lazily on expiry. Tokens are short-lived (minutes); the safety margin keeps
/// a token from expiring mid-request.
pub struct CachedTokenProvider {
    gateway: PesapalClient,
    cached: RwLock<Option<CachedToken>>,
}

const EXPIRY_SAFETY_MARGIN_SECS: i64 = 30;
const DEFAULT_TOKEN_TTL_SECS: i64 = 240;

impl CachedTokenProvider {
    pub fn new(gateway: PesapalClient) -> Self {
        Self {
            gateway,
            cached: RwLock::new(None),
        }
    }

    fn is_fresh(cached: &CachedToken) -> bool {
        cached.expires_at - Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS) > Utc::now()
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn bearer_token(&self) -> Result<String, GatewayError> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if Self::is_fresh(cached) {
                return Ok(cached.token.clone());
            }
        }

        let mut guard = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if Self::is_fresh(cached) {
                return Ok(cached.token.clone());
            }
        }

        let access = self.gateway.request_token().await?;
        let expires_at = access
            .expires_at
            .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_TTL_SECS));

        tracing::debug!(expires_at = %expires_at, "Refreshed gateway bearer token");

        let token = access.token.clone();
        *guard = Some(CachedToken {
            token: access.token,
            expires_at,
        });
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PesapalConfig;
    use secrecy::Secret;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> CachedTokenProvider {
        CachedTokenProvider::new(PesapalClient::new(PesapalConfig {
            consumer_key: "test-key".to_string(),
            consumer_secret: Secret::new("test-secret".to_string()),
            api_base_url: server.uri(),
            callback_url: "https://shop.example/callback".to_string(),
            currency: "KES".to_string(),
            request_timeout_secs: 5,
        }))
    }

    fn token_body(token: &str, ttl_secs: i64) -> serde_json::Value {
        serde_json::json!({
            "token": token,
            "expiryDate": (Utc::now() + Duration::seconds(ttl_secs)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/RequestToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t-1", 300)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.bearer_token().await.unwrap(), "t-1");
        assert_eq!(provider.bearer_token().await.unwrap(), "t-1");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/RequestToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t-old", 5)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/RequestToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t-new", 300)))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        // First token expires within the safety margin, so the second call
        // must re-fetch.
        assert_eq!(provider.bearer_token().await.unwrap(), "t-old");
        assert_eq!(provider.bearer_token().await.unwrap(), "t-new");
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/RequestToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t-1", 300)))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        provider.bearer_token().await.unwrap();
        provider.invalidate().await;
        provider.bearer_token().await.unwrap();
    }
}
