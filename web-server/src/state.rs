// web-server/src/state.rs
use actix_web::web;
use common::{Config, ConfigError};
use std::sync::Arc;
use thiserror::Error;

use crate::api;
use crate::auth_gateway::{AccessTokenProvider, ClientCredentialsGateway};
use crate::nonce::NonceIssuer;
use crate::randomness::RandomnessSource;
use crate::session::SessionStore;
use crate::verifier::MessageVerifier;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Shared services handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub randomness: web::Data<RandomnessSource>,
    pub issuer: web::Data<NonceIssuer>,
    pub verifier: web::Data<MessageVerifier>,
}

impl AppState {
    /// Build all services, using the client-credentials gateway for tokens
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let http = RandomnessSource::http_client(&config.randomness)?;
        let tokens = Arc::new(ClientCredentialsGateway::from_config(&config.randomness, http.clone()));
        Self::with_token_provider(config, http, tokens)
    }

    pub fn with_token_provider(
        config: &Config,
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let sessions = Arc::new(SessionStore::from_config(config)?);
        let randomness = Arc::new(RandomnessSource::from_config(&config.randomness, http, tokens));
        let issuer = NonceIssuer::new(randomness.clone(), sessions.clone());
        let verifier = MessageVerifier::from_config(config, sessions);

        Ok(Self {
            randomness: web::Data::from(randomness),
            issuer: web::Data::new(issuer),
            verifier: web::Data::new(verifier),
        })
    }

    /// Register app data and routes
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.randomness.clone())
            .app_data(self.issuer.clone())
            .app_data(self.verifier.clone());
        api::configure(cfg);
    }
}
