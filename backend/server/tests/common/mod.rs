#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use reqwest::Client;
use serde_json::Value;
use spirit::{
    config::Config,
    invite::InviteLedger,
    reflections::MemoryReflections,
    router,
    state::AppState,
};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const JWT_SECRET: &str = "test-jwt-secret";

const BODY_LIMIT: usize = 1_048_576;

pub fn config() -> Config {
    Config {
        port: 0,
        admin_token: ADMIN_TOKEN.to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        openai_api_key: "sk-test".to_string(),
        openai_model: "gpt-5".to_string(),
        openai_endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        supabase_url: "http://127.0.0.1:9".to_string(),
        supabase_key: "service-key".to_string(),
        rate_limit_burst: 10_000,
        rate_limit_refill: Duration::from_secs(60),
    }
}

pub fn state_with(config: Config) -> Arc<AppState> {
    AppState::with_stores(
        config,
        Client::new(),
        Arc::new(InviteLedger::new()),
        Arc::new(MemoryReflections::new()),
    )
}

pub fn app() -> (Router, Arc<AppState>) {
    let state = state_with(config());

    (router(state.clone()), state)
}

/// Serves `app` on a loopback port and returns its base URL.
pub async fn serve_upstream(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let address = listener.local_addr().expect("upstream address");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve upstream") });

    format!("http://{address}")
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn admin_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("x-admin-token", token);
    }

    builder.body(Body::empty()).expect("build request")
}

pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router call");

    json_body(response).await
}

pub async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .expect("read body");

    (status, serde_json::from_slice(&bytes).expect("parse json"))
}

pub async fn create_code(app: &Router) -> String {
    let (status, body) = call(app, admin_request("POST", "/invite/create", Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);

    body["code"].as_str().expect("code string").to_string()
}

pub async fn verify(app: &Router, code: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({ "code": code }).to_string();

    call(app, post_json("/invite/verify", &body)).await
}
