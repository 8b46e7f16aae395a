// web-server/src/main.rs
use actix_web::{App, HttpServer};
use common::{setup_tracing, Config};
use siwe_nonce_server::api::RATE_LIMITED_PATHS;
use siwe_nonce_server::middleware::RateLimiter;
use siwe_nonce_server::AppState;
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Setup tracing
    setup_tracing();

    // Load configuration
    let config = Config::from_env();

    let state = AppState::from_config(&config).map_err(|e| {
        tracing::error!("Refusing to start: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    // One limiter shared by every worker
    let limiter = RateLimiter::from_config(
        &config.rate_limit,
        RATE_LIMITED_PATHS.iter().map(|p| p.to_string()).collect(),
    );

    let server_addr = config.server.addr.clone();

    if !state.randomness.is_configured() {
        tracing::warn!("No randomness API URL configured; all nonces use local randomness");
    }
    tracing::info!("Starting SIWE nonce server on {} ({} mode)", server_addr, config.run_mode);

    HttpServer::new(move || {
        App::new()
            .wrap(limiter.clone())
            .configure(|cfg| state.register(cfg))
    })
    .bind(&server_addr)?
    .run()
    .await
}
