// web-server/src/nonce.rs
use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use common::redact;
use std::sync::Arc;

use crate::randomness::RandomnessSource;
use crate::session::{SessionError, SessionStore};

/// A freshly bound nonce and the cookie that carries it
pub struct Issuance {
    pub nonce: String,
    /// Informational hint only, never checked during verification
    pub used_fallback: bool,
    pub cookie: Cookie<'static>,
}

/// Binds fresh nonces to the caller's session
pub struct NonceIssuer {
    randomness: Arc<RandomnessSource>,
    sessions: Arc<SessionStore>,
}

impl NonceIssuer {
    pub fn new(randomness: Arc<RandomnessSource>, sessions: Arc<SessionStore>) -> Self {
        Self { randomness, sessions }
    }

    /// Issue a nonce for the session carried by `req`, replacing any
    /// pending one. Randomness problems never fail this call.
    pub async fn issue(&self, req: &HttpRequest) -> Result<Issuance, SessionError> {
        let randomness = self.randomness.obtain().await;

        let mut handle = self.sessions.load(req);
        let sid = handle.sid();
        let is_new = handle.is_new();
        if handle.set_nonce(randomness.value.clone()).is_some() {
            tracing::debug!("Session {} replaced its pending nonce", sid);
        }
        let cookie = handle.persist()?;

        tracing::info!(
            "Issued nonce {} for {} session {} (fallback: {})",
            redact(&randomness.value),
            if is_new { "new" } else { "existing" },
            sid,
            randomness.used_fallback()
        );

        Ok(Issuance {
            used_fallback: randomness.used_fallback(),
            nonce: randomness.value,
            cookie,
        })
    }
}
