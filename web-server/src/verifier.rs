// web-server/src/verifier.rs
use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use common::{Config, VerifyResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionStore;
use crate::siwe::{recover_address, SiweError, SiweMessage};

/// Why a verification attempt was rejected. Every variant still consumes
/// the session nonce.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("No nonce found in session")]
    NoNonce,
    #[error("Missing message or signature")]
    MalformedRequest,
    #[error("Invalid SIWE message: {0}")]
    Parse(#[source] SiweError),
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),
    #[error("Invalid nonce.")]
    NonceMismatch,
    #[error("Message is expired or not yet valid")]
    NotValidNow,
    #[error("Message domain does not match")]
    DomainMismatch,
    /// Details are logged, never returned to the client
    #[error("Verification failed")]
    Internal(String),
}

impl VerifyError {
    /// Stable short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::NoNonce => "no_nonce",
            VerifyError::MalformedRequest => "malformed_request",
            VerifyError::Parse(_) => "parse",
            VerifyError::SignatureInvalid(_) => "signature_invalid",
            VerifyError::NonceMismatch => "nonce_mismatch",
            VerifyError::NotValidNow => "not_valid_now",
            VerifyError::DomainMismatch => "domain_mismatch",
            VerifyError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for VerifyError {
    fn status_code(&self) -> StatusCode {
        match self {
            VerifyError::NoNonce | VerifyError::MalformedRequest => StatusCode::BAD_REQUEST,
            VerifyError::NonceMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            VerifyError::Parse(_)
            | VerifyError::SignatureInvalid(_)
            | VerifyError::NotValidNow
            | VerifyError::DomainMismatch
            | VerifyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(VerifyResponse::failure(self.to_string()))
    }
}

/// Outcome of one verification attempt plus the cookie that clears the
/// session, to be attached to the response whatever the outcome.
pub struct Verification {
    pub outcome: Result<SiweMessage, VerifyError>,
    pub cookie: Cookie<'static>,
}

/// Parse and check a signed message without touching any session state
pub fn check_signed_message(
    raw_message: &str,
    signature: &str,
    expected_domain: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SiweMessage, VerifyError> {
    let message: SiweMessage = raw_message.parse().map_err(VerifyError::Parse)?;

    let signer = recover_address(raw_message, signature)
        .map_err(|e| VerifyError::SignatureInvalid(e.to_string()))?;
    if !signer.eq_ignore_ascii_case(&message.address) {
        return Err(VerifyError::SignatureInvalid(
            "Signature does not match address of the message.".to_string(),
        ));
    }

    if let Some(domain) = expected_domain {
        if message.domain != domain {
            return Err(VerifyError::DomainMismatch);
        }
    }

    if !message.is_valid_at(now) {
        return Err(VerifyError::NotValidNow);
    }

    Ok(message)
}

/// Verifies signed messages against the nonce bound to the caller's session
pub struct MessageVerifier {
    sessions: Arc<SessionStore>,
    expected_domain: Option<String>,
    timeout: Duration,
}

impl MessageVerifier {
    pub fn new(sessions: Arc<SessionStore>, expected_domain: Option<String>, timeout: Duration) -> Self {
        Self {
            sessions,
            expected_domain,
            timeout,
        }
    }

    pub fn from_config(config: &Config, sessions: Arc<SessionStore>) -> Self {
        Self::new(
            sessions,
            config.siwe.domain.clone(),
            Duration::from_millis(config.siwe.verify_timeout_ms),
        )
    }

    /// Verify `message`/`signature` for the session carried by `req`.
    /// The session nonce is consumed no matter how this ends.
    pub async fn verify(&self, message: Option<&str>, signature: Option<&str>, req: &HttpRequest) -> Verification {
        let mut handle = self.sessions.load(req);
        let sid = handle.sid();
        let expected = handle.nonce().map(str::to_owned);

        handle.destroy();
        let cookie = handle.persist().unwrap_or_else(|e| {
            tracing::error!("Error destroying session {}: {}", sid, e);
            self.sessions.removal_cookie()
        });

        let outcome = self.check(expected, message, signature).await;

        match &outcome {
            Ok(verified) => tracing::info!(
                "Session {} verified address {} on chain {}",
                sid, verified.address, verified.chain_id
            ),
            Err(VerifyError::Internal(detail)) => tracing::error!(
                "Verification error for session {}: {}", sid, detail
            ),
            Err(e) => tracing::warn!(
                "Verification rejected for session {} ({}): {}", sid, e.kind(), e
            ),
        }

        Verification { outcome, cookie }
    }

    async fn check(
        &self,
        expected: Option<String>,
        message: Option<&str>,
        signature: Option<&str>,
    ) -> Result<SiweMessage, VerifyError> {
        let expected = expected.ok_or(VerifyError::NoNonce)?;

        let present = |value: Option<&str>| value.filter(|v| !v.trim().is_empty()).map(str::to_owned);
        let (message, signature) = match (present(message), present(signature)) {
            (Some(message), Some(signature)) => (message, signature),
            _ => return Err(VerifyError::MalformedRequest),
        };

        let domain = self.expected_domain.clone();
        let task = web::block(move || {
            check_signed_message(&message, &signature, domain.as_deref(), Utc::now())
        });

        let verified = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(VerifyError::Internal(format!("verification task failed: {}", e))),
            Err(_) => return Err(VerifyError::Internal("verification timed out".to_string())),
        };

        // Exact match, case-sensitive
        if verified.nonce != expected {
            return Err(VerifyError::NonceMismatch);
        }

        Ok(verified)
    }
}
