// web-server/src/api/random.rs
use actix_web::{get, web, HttpResponse};
use common::RandomResponse;
use serde_json::json;

use crate::randomness::{RandomnessError, RandomnessSource};

// Raw cosmic seed. Unlike /api/nonce this reports a missing access token
// as 401 instead of quietly falling back.
#[get("/random")]
pub async fn get_random(randomness: web::Data<RandomnessSource>) -> HttpResponse {
    match randomness.fetch_seed().await {
        Ok(seed) => HttpResponse::Ok().json(RandomResponse {
            seed: Some(seed),
            used_fallback: false,
        }),
        Err(RandomnessError::Unauthorized) => {
            tracing::warn!("Randomness service authentication failed");
            HttpResponse::Unauthorized().json(json!({
                "message": "Authentication failed"
            }))
        },
        Err(e) => {
            tracing::warn!("Using fallback random generation: {}", e);
            HttpResponse::Ok().json(RandomResponse {
                seed: None,
                used_fallback: true,
            })
        }
    }
}
