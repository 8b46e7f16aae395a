// web-server/tests/randomness_test.rs
use actix_web::http::StatusCode;
use actix_web::{test, web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use common::{Config, NonceResponse};
use serde_json::{json, Value};
use siwe_nonce_server::auth_gateway::{AccessTokenProvider, ClientCredentialsGateway};
use siwe_nonce_server::randomness::{RandomnessError, RandomnessSource, Source, TRNG_PATH};
use siwe_nonce_server::utils::token::nonce_from_seed;
use siwe_nonce_server::AppState;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "orbitport-test-token";

struct FixedToken(Option<&'static str>);

#[async_trait]
impl AccessTokenProvider for FixedToken {
    async fn valid_token(&self) -> Option<String> {
        self.0.map(str::to_string)
    }
}

fn seed_body() -> Value {
    json!({
        "service": "trng",
        "src": "aptosorbital",
        "data": "7f3a9c0e5b1d4f2a8c6e0b9d3f1a5c7e",
        "signature": {
            "value": "3045022100ab",
            "pk": "04cd",
            "algo": "secp256k1"
        }
    })
}

/// Start a fake TRNG service answering `status` with `body` and insisting on
/// the bearer token. Optionally waits before answering.
async fn spawn_trng(status: u16, body: Value, delay: Duration) -> String {
    let server = HttpServer::new(move || {
        let body = body.clone();
        App::new().route(
            TRNG_PATH,
            web::get().to(move |req: HttpRequest| {
                let body = body.clone();
                async move {
                    tokio::time::sleep(delay).await;
                    let authorized = req.headers()
                        .get("Authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer orbitport-test-token");
                    if !authorized {
                        return HttpResponse::Unauthorized().finish();
                    }
                    HttpResponse::build(StatusCode::from_u16(status).unwrap()).json(body)
                }
            }),
        )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{}", addr)
}

fn source(api_url: Option<String>, token: Option<&'static str>, timeout: Duration) -> RandomnessSource {
    let http = reqwest::Client::builder().timeout(timeout).build().unwrap();
    RandomnessSource::new(api_url, http, Arc::new(FixedToken(token)))
}

fn app_state(api_url: Option<String>, token: Option<&'static str>) -> AppState {
    let mut config = Config::default();
    config.session.secret = "a-very-long-test-secret-for-session-cookies".to_string();
    config.randomness.api_url = api_url;
    let http = RandomnessSource::http_client(&config.randomness).unwrap();
    AppState::with_token_provider(&config, http, Arc::new(FixedToken(token))).unwrap()
}

#[actix_web::test]
async fn test_cosmic_seed_becomes_nonce() {
    let url = spawn_trng(200, seed_body(), Duration::ZERO).await;
    let randomness = source(Some(url), Some(TOKEN), Duration::from_secs(3)).obtain().await;

    assert!(matches!(randomness.source, Source::Cosmic));
    assert!(!randomness.used_fallback());
    assert_eq!(randomness.value, nonce_from_seed("7f3a9c0e5b1d4f2a8c6e0b9d3f1a5c7e"));
}

#[actix_web::test]
async fn test_upstream_error_status_falls_back() {
    let url = spawn_trng(500, json!({ "error": "boom" }), Duration::ZERO).await;
    let source = source(Some(url), Some(TOKEN), Duration::from_secs(3));

    assert!(matches!(
        source.fetch_seed().await,
        Err(RandomnessError::Status { status: 500, .. })
    ));
    let randomness = source.obtain().await;
    assert!(matches!(
        randomness.fallback_cause(),
        Some(RandomnessError::Status { status: 500, .. })
    ));
    assert!(randomness.value.len() >= 8);
}

#[actix_web::test]
async fn test_upstream_error_body_is_truncated() {
    let url = spawn_trng(500, json!({ "error": "e".repeat(5_000) }), Duration::ZERO).await;
    let source = source(Some(url), Some(TOKEN), Duration::from_secs(3));

    match source.fetch_seed().await {
        Err(RandomnessError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.len() < 300);
            assert!(body.ends_with("..."));
        },
        other => panic!("unexpected result: {:?}", other.map(|seed| seed.data)),
    }
}

#[actix_web::test]
async fn test_malformed_body_falls_back() {
    let url = spawn_trng(200, json!({ "unexpected": true }), Duration::ZERO).await;
    let source = source(Some(url), Some(TOKEN), Duration::from_secs(3));

    assert!(matches!(source.fetch_seed().await, Err(RandomnessError::Malformed(_))));
    assert!(source.obtain().await.used_fallback());
}

#[actix_web::test]
async fn test_slow_upstream_times_out() {
    let url = spawn_trng(200, seed_body(), Duration::from_secs(2)).await;
    let source = source(Some(url), Some(TOKEN), Duration::from_millis(200));

    assert!(matches!(source.fetch_seed().await, Err(RandomnessError::Timeout)));
    assert!(matches!(source.obtain().await.source, Source::Fallback(RandomnessError::Timeout)));
}

#[actix_web::test]
async fn test_unreachable_upstream_falls_back() {
    let source = source(Some("http://127.0.0.1:1".to_string()), Some(TOKEN), Duration::from_secs(3));
    assert!(source.obtain().await.used_fallback());
}

#[actix_web::test]
async fn test_nonce_endpoint_survives_upstream_failure() {
    let url = spawn_trng(500, json!({ "error": "boom" }), Duration::ZERO).await;
    let app = test::init_service(App::new().configure(|cfg| app_state(Some(url), Some(TOKEN)).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/nonce").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: NonceResponse = test::read_body_json(resp).await;
    assert!(!body.nonce.is_empty());
    assert!(body.used_fallback);
}

#[actix_web::test]
async fn test_nonce_endpoint_uses_cosmic_seed() {
    let url = spawn_trng(200, seed_body(), Duration::ZERO).await;
    let app = test::init_service(App::new().configure(|cfg| app_state(Some(url), Some(TOKEN)).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/nonce").to_request();
    let resp = test::call_service(&app, req).await;
    let body: NonceResponse = test::read_body_json(resp).await;
    assert!(!body.used_fallback);
    assert_eq!(body.nonce, nonce_from_seed("7f3a9c0e5b1d4f2a8c6e0b9d3f1a5c7e"));
}

#[actix_web::test]
async fn test_nonce_endpoint_without_token_falls_back() {
    let url = spawn_trng(200, seed_body(), Duration::ZERO).await;
    let app = test::init_service(App::new().configure(|cfg| app_state(Some(url), None).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/nonce").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: NonceResponse = test::read_body_json(resp).await;
    assert!(body.used_fallback);
}

#[actix_web::test]
async fn test_random_endpoint_returns_seed() {
    let url = spawn_trng(200, seed_body(), Duration::ZERO).await;
    let app = test::init_service(App::new().configure(|cfg| app_state(Some(url), Some(TOKEN)).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/random").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"], "7f3a9c0e5b1d4f2a8c6e0b9d3f1a5c7e");
    assert_eq!(body["signature"]["algo"], "secp256k1");
    assert_eq!(body["usedFallback"], false);
}

#[actix_web::test]
async fn test_random_endpoint_reports_auth_failure() {
    let url = spawn_trng(200, seed_body(), Duration::ZERO).await;
    let app = test::init_service(App::new().configure(|cfg| app_state(Some(url), None).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/random").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "message": "Authentication failed" }));
}

#[actix_web::test]
async fn test_random_endpoint_falls_back_without_configuration() {
    let app = test::init_service(App::new().configure(|cfg| app_state(None, Some(TOKEN)).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/random").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "usedFallback": true }));
}

#[actix_web::test]
async fn test_random_endpoint_falls_back_on_upstream_error() {
    let url = spawn_trng(503, json!({}), Duration::ZERO).await;
    let app = test::init_service(App::new().configure(|cfg| app_state(Some(url), Some(TOKEN)).register(cfg))).await;

    let req = test::TestRequest::get().uri("/api/random").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "usedFallback": true }));
}

#[actix_web::test]
async fn test_unconfigured_gateway_disables_cosmic_nonces() {
    let url = spawn_trng(200, seed_body(), Duration::ZERO).await;
    let http = reqwest::Client::new();
    let gateway = Arc::new(ClientCredentialsGateway::new(http.clone(), None));
    let source = RandomnessSource::new(Some(url), http, gateway);

    assert!(matches!(source.fetch_seed().await, Err(RandomnessError::Unauthorized)));
    assert!(source.obtain().await.used_fallback());
}
