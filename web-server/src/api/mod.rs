// web-server/src/api/mod.rs
pub mod auth;
pub mod random;

use actix_web::{get, web, HttpResponse, Responder};
use common::HealthResponse;

use crate::randomness::RandomnessSource;

/// Routes subject to rate limiting
pub const RATE_LIMITED_PATHS: [&str; 2] = ["/api/nonce", "/api/verify"];

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health)
            .service(auth::get_nonce)
            .service(auth::verify)
            .service(random::get_random)
    );
}

#[get("/health")]
pub async fn health(randomness: web::Data<RandomnessSource>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        randomness_configured: randomness.is_configured(),
    })
}
