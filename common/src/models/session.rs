// common/src/models/session.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session state carried, encrypted, in the session cookie.
///
/// Holds at most one pending nonce. Writing a new nonce makes the previous
/// one permanently unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Opaque session identifier, only used to correlate log lines
    pub sid: Uuid,
    /// Nonce bound by the last issuance, if not yet consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl SessionData {
    /// Create an empty session for a first visit
    pub fn new() -> Self {
        Self {
            sid: Uuid::new_v4(),
            nonce: None,
        }
    }

    /// Bind a nonce, replacing any previous one
    pub fn bind_nonce(&mut self, nonce: String) -> Option<String> {
        self.nonce.replace(nonce)
    }

    /// Remove and return the bound nonce
    pub fn take_nonce(&mut self) -> Option<String> {
        self.nonce.take()
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}
