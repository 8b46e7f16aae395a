// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};
use thiserror::Error;
use url::Url;

/// Minimum length of the session secret; the cookie key is derived from it.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Central configuration for the nonce service
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// "development", "production", ... Only affects the cookie `Secure` flag.
    pub run_mode: String,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub randomness: RandomnessConfig,
    pub siwe: SiweConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Secret the cookie encryption key is derived from. Required.
    pub secret: String,
    pub cookie_name: String,
    pub max_age_secs: i64,
}

/// External cosmic randomness service (Orbitport) and its token broker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomnessConfig {
    /// Base URL of the TRNG API. Absent means every nonce uses local randomness.
    pub api_url: Option<String>,
    /// OAuth2 token endpoint used for the client-credentials grant
    pub auth_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub audience: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SiweConfig {
    /// When set, signed messages must name exactly this domain
    pub domain: Option<String>,
    pub verify_timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
    /// Key clients on `Forwarded`/`X-Forwarded-For`. Only enable behind a
    /// proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("session secret is not configured")]
    MissingSessionSecret,
    #[error("session secret must be at least 32 bytes, got {0}")]
    SessionSecretTooShort(usize),
    #[error("invalid URL in `{field}`: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_mode: "development".to_string(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            randomness: RandomnessConfig {
                timeout_ms: 3000,
                ..RandomnessConfig::default()
            },
            siwe: SiweConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8081".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: "siwe-nonce-app-session".to_string(),
            max_age_secs: 60 * 60 * 24 * 7, // 7 days
        }
    }
}

impl Default for SiweConfig {
    fn default() -> Self {
        Self {
            domain: None,
            verify_timeout_ms: 5000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
            trust_proxy_headers: false,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .set_default("run_mode", run_mode.clone())?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables with prefix "APP", e.g. APP__SESSION__SECRET
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Well-known deployment variables win over everything else
            .set_override_option("session.secret", env::var("AUTH_SECRET").ok())?
            .set_override_option("randomness.api_url", env::var("ORBITPORT_API_URL").ok())?
            .set_override_option("randomness.auth_url", env::var("ORBITPORT_AUTH_URL").ok())?
            .set_override_option("randomness.client_id", env::var("ORBITPORT_CLIENT_ID").ok())?
            .set_override_option("randomness.client_secret", env::var("ORBITPORT_CLIENT_SECRET").ok())?
            .set_override_option("randomness.audience", env::var("ORBITPORT_AUDIENCE").ok())?
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, or from plain environment variables if that fails
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let defaults = Self::default();

                let run_mode = env::var("RUN_MODE").unwrap_or(defaults.run_mode);

                let addr = env::var("WEB_SERVER_ADDR").unwrap_or(defaults.server.addr);

                let secret = env::var("AUTH_SECRET").unwrap_or_default();

                let timeout_ms = env::var("ORBITPORT_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.randomness.timeout_ms);

                Self {
                    run_mode,
                    server: ServerConfig { addr },
                    session: SessionConfig {
                        secret,
                        ..defaults.session
                    },
                    randomness: RandomnessConfig {
                        api_url: env::var("ORBITPORT_API_URL").ok(),
                        auth_url: env::var("ORBITPORT_AUTH_URL").ok(),
                        client_id: env::var("ORBITPORT_CLIENT_ID").ok(),
                        client_secret: env::var("ORBITPORT_CLIENT_SECRET").ok(),
                        audience: env::var("ORBITPORT_AUDIENCE").ok(),
                        timeout_ms,
                    },
                    siwe: SiweConfig {
                        domain: env::var("SIWE_DOMAIN").ok(),
                        ..defaults.siwe
                    },
                    rate_limit: defaults.rate_limit,
                }
            }
        }
    }

    /// Cookies are only marked `Secure` in production
    pub fn is_production(&self) -> bool {
        self.run_mode.eq_ignore_ascii_case("production")
    }

    /// Check the settings the server cannot start without
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret_len = self.session.secret.len();
        if secret_len == 0 {
            return Err(ConfigError::MissingSessionSecret);
        }
        if secret_len < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::SessionSecretTooShort(secret_len));
        }

        let urls = [
            ("randomness.api_url", &self.randomness.api_url),
            ("randomness.auth_url", &self.randomness.auth_url),
        ];
        for (field, value) in urls {
            if let Some(raw) = value {
                Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })?;
            }
        }

        Ok(())
    }
}
