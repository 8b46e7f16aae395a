// web-server/src/api/auth.rs
use actix_web::{get, post, web, HttpRequest, HttpResponse, ResponseError};
use common::{ErrorResponse, NonceResponse, VerifyRequest, VerifyResponse};

use crate::nonce::NonceIssuer;
use crate::verifier::MessageVerifier;

// Issue a fresh nonce bound to the caller's session
#[get("/nonce")]
pub async fn get_nonce(
    req: HttpRequest,
    issuer: web::Data<NonceIssuer>,
) -> HttpResponse {
    match issuer.issue(&req).await {
        Ok(issuance) => HttpResponse::Ok()
            .cookie(issuance.cookie)
            .json(NonceResponse {
                nonce: issuance.nonce,
                used_fallback: issuance.used_fallback,
            }),
        Err(e) => {
            tracing::error!("Error issuing nonce: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Internal server error".to_string(),
            })
        }
    }
}

// Verify a signed SIWE message; always consumes the session nonce
#[post("/verify")]
pub async fn verify(
    req: HttpRequest,
    body: web::Bytes,
    verifier: web::Data<MessageVerifier>,
) -> HttpResponse {
    // An unreadable body is answered like one with missing fields
    let payload: VerifyRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        tracing::debug!("Unreadable verify body: {}", e);
        VerifyRequest::default()
    });

    let verification = verifier
        .verify(payload.message.as_deref(), payload.signature.as_deref(), &req)
        .await;

    let mut response = match &verification.outcome {
        Ok(_) => HttpResponse::Ok().json(VerifyResponse::success()),
        Err(e) => e.error_response(),
    };

    if let Err(e) = response.add_cookie(&verification.cookie) {
        tracing::error!("Error attaching session removal cookie: {}", e);
    }

    response
}
