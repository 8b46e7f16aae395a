// web-server/src/randomness.rs
use common::{redact, RandomnessConfig, SeedResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth_gateway::AccessTokenProvider;
use crate::utils::token::{generate_fallback_nonce, nonce_from_seed};

/// Path of the TRNG service below the configured base URL
pub const TRNG_PATH: &str = "/api/v1/services/trng";

/// Upstream error bodies are cut to this many characters
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Failure talking to the cosmic randomness service
#[derive(Debug, Error)]
pub enum RandomnessError {
    #[error("Missing Orbitport API URL")]
    NotConfigured,
    #[error("no access token available for the randomness service")]
    Unauthorized,
    #[error("API request failed: {status}")]
    Status { status: u16, body: String },
    #[error("randomness request timed out")]
    Timeout,
    #[error("randomness request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed randomness response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RandomnessError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RandomnessError::Timeout
        } else if e.is_decode() {
            RandomnessError::Malformed(e.to_string())
        } else {
            RandomnessError::Transport(e)
        }
    }
}

/// Where an issued value came from
#[derive(Debug)]
pub enum Source {
    Cosmic,
    /// Local randomness, with the reason the cosmic service was not used
    Fallback(RandomnessError),
}

/// An unpredictable alphanumeric value and its provenance
#[derive(Debug)]
pub struct Randomness {
    pub value: String,
    pub source: Source,
}

impl Randomness {
    pub fn used_fallback(&self) -> bool {
        matches!(self.source, Source::Fallback(_))
    }

    pub fn fallback_cause(&self) -> Option<&RandomnessError> {
        match &self.source {
            Source::Cosmic => None,
            Source::Fallback(cause) => Some(cause),
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

/// Cosmic TRNG client with local fallback
pub struct RandomnessSource {
    api_url: Option<String>,
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl RandomnessSource {
    pub fn new(api_url: Option<String>, http: reqwest::Client, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            api_url: api_url.map(|url| url.trim_end_matches('/').to_string()),
            http,
            tokens,
        }
    }

    pub fn from_config(config: &RandomnessConfig, http: reqwest::Client, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::new(config.api_url.clone(), http, tokens)
    }

    /// HTTP client with the bounded timeout used for every upstream call
    pub fn http_client(config: &RandomnessConfig) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
    }

    pub fn is_configured(&self) -> bool {
        self.api_url.is_some()
    }

    /// Fetch one seed from the cosmic service. Surfaces every failure.
    pub async fn fetch_seed(&self) -> Result<SeedResponse, RandomnessError> {
        let base = self.api_url.as_deref().ok_or(RandomnessError::NotConfigured)?;
        let token = self.tokens.valid_token().await.ok_or(RandomnessError::Unauthorized)?;

        let response = self.http
            .get(format!("{}{}", base, TRNG_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            tracing::error!("Orbitport API error {}: {}", status, body);
            return Err(RandomnessError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let seed: SeedResponse = response.json().await?;
        if seed.data.trim().is_empty() {
            return Err(RandomnessError::Malformed("empty seed data".to_string()));
        }

        Ok(seed)
    }

    /// Produce a nonce-grade random value. Never fails: any problem with the
    /// cosmic service falls back to local randomness.
    pub async fn obtain(&self) -> Randomness {
        match self.fetch_seed().await {
            Ok(seed) => {
                tracing::debug!("Using cosmic seed from {} ({})", seed.src, redact(&seed.data));
                Randomness {
                    value: nonce_from_seed(&seed.data),
                    source: Source::Cosmic,
                }
            },
            Err(e) => {
                match &e {
                    RandomnessError::NotConfigured => tracing::debug!("Using fallback random generation: {}", e),
                    _ => tracing::warn!("Using fallback random generation: {}", e),
                }
                Randomness {
                    value: generate_fallback_nonce(),
                    source: Source::Fallback(e),
                }
            }
        }
    }
}
