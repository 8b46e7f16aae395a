// web-server/src/auth_gateway.rs
use async_trait::async_trait;
use common::RandomnessConfig;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Tokens are treated as expired this long before the issuer says so
const EXPIRY_SKEW: Duration = Duration::from_secs(60);
/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Source of bearer tokens for the randomness service.
///
/// Must be safe to call concurrently. A returned token stays valid for at
/// least the duration of one upstream request.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn valid_token(&self) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("client credentials are not configured")]
    NotConfigured,
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint answered with status {0}")]
    Status(u16),
}

/// OAuth2 client-credentials settings
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: Option<String>,
}

impl ClientCredentials {
    /// All of token URL, client id and secret must be present
    pub fn from_config(config: &RandomnessConfig) -> Option<Self> {
        Some(Self {
            token_url: config.auth_url.clone()?,
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone()?,
            audience: config.audience.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

/// Client-credentials token broker with a process-wide cache.
///
/// The cache lock is held across a refresh, so concurrent callers wait for
/// the one in-flight refresh instead of starting their own.
pub struct ClientCredentialsGateway {
    http: reqwest::Client,
    credentials: Option<ClientCredentials>,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsGateway {
    pub fn new(http: reqwest::Client, credentials: Option<ClientCredentials>) -> Self {
        Self {
            http,
            credentials,
            cache: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RandomnessConfig, http: reqwest::Client) -> Self {
        let credentials = ClientCredentials::from_config(config);
        if credentials.is_none() && config.api_url.is_some() {
            tracing::warn!("Randomness API configured without client credentials; cosmic nonces are disabled");
        }
        Self::new(http, credentials)
    }

    /// Return a cached token or fetch a new one
    pub async fn token(&self) -> Result<String, GatewayError> {
        let credentials = self.credentials.as_ref().ok_or(GatewayError::NotConfigured)?;

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        let fresh = self.request_token(credentials).await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self, credentials: &ClientCredentials) -> Result<CachedToken, GatewayError> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        if let Some(audience) = credentials.audience.as_deref() {
            form.push(("audience", audience));
        }

        let response = self.http
            .post(&credentials.token_url)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = body.expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        tracing::info!("Obtained randomness access token valid for {}s", lifetime.as_secs());

        Ok(CachedToken {
            value: body.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        })
    }
}

#[async_trait]
impl AccessTokenProvider for ClientCredentialsGateway {
    async fn valid_token(&self) -> Option<String> {
        match self.token().await {
            Ok(token) => Some(token),
            Err(GatewayError::NotConfigured) => None,
            Err(e) => {
                tracing::warn!("Failed to obtain randomness access token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn spawn_token_server(hits: Arc<AtomicUsize>, expires_in: u64) -> String {
        let server = HttpServer::new(move || {
            let hits = hits.clone();
            App::new().route(
                "/oauth/token",
                web::post().to(move || {
                    let hits = hits.clone();
                    async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                        HttpResponse::Ok().json(serde_json::json!({
                            "access_token": format!("token-{}", n),
                            "expires_in": expires_in,
                            "token_type": "Bearer"
                        }))
                    }
                }),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}/oauth/token", addr)
    }

    fn credentials(token_url: String) -> ClientCredentials {
        ClientCredentials {
            token_url,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            audience: Some("https://orbitport".to_string()),
        }
    }

    #[test]
    fn test_credentials_require_all_fields() {
        let mut config = RandomnessConfig::default();
        config.auth_url = Some("https://auth.example/oauth/token".to_string());
        config.client_id = Some("id".to_string());
        assert!(ClientCredentials::from_config(&config).is_none());

        config.client_secret = Some("secret".to_string());
        assert!(ClientCredentials::from_config(&config).is_some());
    }

    #[actix_web::test]
    async fn test_unconfigured_gateway_yields_no_token() {
        let gateway = ClientCredentialsGateway::new(reqwest::Client::new(), None);
        assert!(gateway.valid_token().await.is_none());
    }

    #[actix_web::test]
    async fn test_token_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_token_server(hits.clone(), 3600).await;
        let gateway = ClientCredentialsGateway::new(reqwest::Client::new(), Some(credentials(url)));

        assert_eq!(gateway.valid_token().await.as_deref(), Some("token-1"));
        assert_eq!(gateway.valid_token().await.as_deref(), Some("token-1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_token_server(hits.clone(), 3600).await;
        let gateway = ClientCredentialsGateway::new(reqwest::Client::new(), Some(credentials(url)));

        let (a, b) = futures_util::future::join(gateway.valid_token(), gateway.valid_token()).await;
        assert_eq!(a, b);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_short_lived_token_is_refreshed() {
        let hits = Arc::new(AtomicUsize::new(0));
        // Lifetime below the skew means every call refreshes
        let url = spawn_token_server(hits.clone(), 30).await;
        let gateway = ClientCredentialsGateway::new(reqwest::Client::new(), Some(credentials(url)));

        assert_eq!(gateway.valid_token().await.as_deref(), Some("token-1"));
        assert_eq!(gateway.valid_token().await.as_deref(), Some("token-2"));
    }

    #[actix_web::test]
    async fn test_unreachable_token_endpoint_yields_no_token() {
        let gateway = ClientCredentialsGateway::new(
            reqwest::Client::new(),
            Some(credentials("http://127.0.0.1:1/oauth/token".to_string())),
        );
        assert!(gateway.valid_token().await.is_none());
    }
}
