// common/src/messages.rs
use serde::{Deserialize, Serialize};

/// Response of `GET /api/nonce`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
    /// Informational only. Never checked during verification.
    pub used_fallback: bool,
}

/// Body of `POST /api/verify`. Both fields are optional so a missing one
/// can be answered as a malformed request instead of a JSON error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Response of `POST /api/verify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerifyResponse {
    pub fn success() -> Self {
        Self { ok: true, message: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

/// Signature the TRNG service attaches to each seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSignature {
    pub value: String,
    pub pk: String,
    pub algo: String,
}

/// Seed payload returned by the cosmic TRNG service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResponse {
    pub service: String,
    pub src: String,
    pub data: String,
    pub signature: SeedSignature,
}

/// Response of `GET /api/random`. The seed fields are absent on fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomResponse {
    #[serde(flatten)]
    pub seed: Option<SeedResponse>,
    pub used_fallback: bool,
}

/// Response of `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
    pub randomness_configured: bool,
}

/// Generic error body for non-verify endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nonce_response_uses_camel_case() {
        let body = serde_json::to_value(NonceResponse {
            nonce: "abc12345".to_string(),
            used_fallback: true,
        })
        .unwrap();
        assert_eq!(body, json!({ "nonce": "abc12345", "usedFallback": true }));
    }

    #[test]
    fn test_random_response_flattens_seed() {
        let seed = SeedResponse {
            service: "trng".to_string(),
            src: "aptosorbital".to_string(),
            data: "deadbeef".to_string(),
            signature: SeedSignature {
                value: "sig".to_string(),
                pk: "pk".to_string(),
                algo: "secp256k1".to_string(),
            },
        };
        let body = serde_json::to_value(RandomResponse {
            seed: Some(seed),
            used_fallback: false,
        })
        .unwrap();
        assert_eq!(body["data"], "deadbeef");
        assert_eq!(body["signature"]["algo"], "secp256k1");
        assert_eq!(body["usedFallback"], false);
    }

    #[test]
    fn test_random_fallback_has_no_seed_fields() {
        let body = serde_json::to_value(RandomResponse {
            seed: None,
            used_fallback: true,
        })
        .unwrap();
        assert_eq!(body, json!({ "usedFallback": true }));
    }

    #[test]
    fn test_verify_request_tolerates_missing_fields() {
        let req: VerifyRequest = serde_json::from_value(json!({ "message": "hi" })).unwrap();
        assert_eq!(req.message.as_deref(), Some("hi"));
        assert!(req.signature.is_none());
    }

    #[test]
    fn test_verify_success_omits_message() {
        let body = serde_json::to_value(VerifyResponse::success()).unwrap();
        assert_eq!(body, json!({ "ok": true }));
    }
}
