//! Shared helpers for HTTP-level integration tests.
//!
//! Builds the application router exactly as production does (same
//! middleware stack via `build_app_router`), with a fixed JWT secret so
//! tests can mint their own tokens.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use sqlx::PgPool;
use tower::ServiceExt;

use sokoni_api::auth::jwt::{generate_access_token, JwtConfig};
use sokoni_api::config::ServerConfig;
use sokoni_api::router::build_app_router;
use sokoni_api::state::AppState;
use sokoni_db::models::user::CreateUser;
use sokoni_db::repositories::UserRepo;

/// Fixed secret for test tokens.
const TEST_JWT_SECRET: &str = "test-secret-not-for-production";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// Create a user with the given role and return `(user_id, bearer_token)`.
pub async fn user_with_role(pool: &PgPool, email: &str, role: &str) -> (i64, String) {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: email.to_string(),
            display_name: email.to_string(),
            role: role.to_string(),
        },
    )
    .await
    .expect("create user");
    let token = generate_access_token(user.id, &test_config().jwt).expect("mint token");
    (user.id, token)
}

/// Send a GET request with a bearer token.
pub async fn get(app: Router, uri: &str, token: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a POST request with a JSON body and a bearer token.
pub async fn post_json(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a POST request with a JSON body and no credentials.
pub async fn post_json_anon(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

/// Assert a response status and return the parsed body.
pub async fn expect_status(
    response: Response<Body>,
    expected: StatusCode,
) -> serde_json::Value {
    let status = response.status();
    let body = body_json(response).await;
    assert_eq!(status, expected, "unexpected status, body: {body}");
    body
}
