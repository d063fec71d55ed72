// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures: an in-process identity provider and gateway builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use authgate_server::{api, config::SecurityConfig, state::AppState};
use axum::{
    body::Body,
    extract::{Form, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const KEY_ID: &str = "test-key";
pub const SIGNING_SECRET: &[u8] = b"integration-signing-secret-0123456789";
pub const CLIENT_ID: &str = "authgate";
pub const COOKIE_SECRET: &str = "0123456789abcdef0123456789abcdef";

struct IdpState {
    issuer: String,
    jwks_available: AtomicBool,
    jwks_hits: AtomicUsize,
    token_hits: AtomicUsize,
    token_response: Mutex<Value>,
}

/// Identity provider serving discovery, JWKS and token endpoints on a
/// loopback port.
pub struct MockIdp {
    pub issuer: String,
    state: Arc<IdpState>,
}

impl MockIdp {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let issuer = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(IdpState {
            issuer: issuer.clone(),
            jwks_available: AtomicBool::new(true),
            jwks_hits: AtomicUsize::new(0),
            token_hits: AtomicUsize::new(0),
            token_response: Mutex::new(json!({})),
        });

        let app = Router::new()
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/jwks", get(jwks))
            .route("/token", post(token))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { issuer, state }
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/jwks", self.issuer)
    }

    pub fn set_jwks_available(&self, available: bool) {
        self.state.jwks_available.store(available, Ordering::SeqCst);
    }

    pub fn jwks_hits(&self) -> usize {
        self.state.jwks_hits.load(Ordering::SeqCst)
    }

    pub fn token_hits(&self) -> usize {
        self.state.token_hits.load(Ordering::SeqCst)
    }

    /// Body returned by the next code exchanges.
    pub fn set_token_response(&self, body: Value) {
        *self.state.token_response.lock().unwrap() = body;
    }
}

async fn discovery(State(state): State<Arc<IdpState>>) -> Json<Value> {
    Json(json!({
        "issuer": state.issuer,
        "authorization_endpoint": format!("{}/auth", state.issuer),
        "token_endpoint": format!("{}/token", state.issuer),
        "jwks_uri": format!("{}/jwks", state.issuer),
        "response_types_supported": ["code"],
    }))
}

async fn jwks(State(state): State<Arc<IdpState>>) -> Response {
    state.jwks_hits.fetch_add(1, Ordering::SeqCst);
    if !state.jwks_available.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({
        "keys": [{
            "kty": "oct",
            "kid": KEY_ID,
            "alg": "HS256",
            "use": "sig",
            "k": URL_SAFE_NO_PAD.encode(SIGNING_SECRET),
        }]
    }))
    .into_response()
}

async fn token(
    State(state): State<Arc<IdpState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let body = state.token_response.lock().unwrap().clone();
    Json(body).into_response()
}

/// HS256 token signed with the provider's published key.
pub fn sign(claims: &Value) -> String {
    sign_with(claims, SIGNING_SECRET)
}

pub fn sign_with(claims: &Value, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KEY_ID.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

/// Unix timestamp `secs` seconds from now.
pub fn in_secs(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

/// `authZ` section backed by the policy under `tests/testdata`.
pub fn file_authz() -> String {
    let testdata = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata");
    format!(
        "authZ:\n  provider: file\n  file:\n    modelPath: {testdata}/authz-model.conf\n    policyPath: {testdata}/authz-policy.csv\n"
    )
}

pub fn security(authn: &str) -> SecurityConfig {
    serde_yaml::from_str(&format!("{authn}{}", file_authz())).unwrap()
}

async fn ok() -> &'static str {
    "ok"
}

/// Gateway routes plus a protected `/api/v1/clusters` business endpoint.
pub async fn gateway(security: &SecurityConfig) -> Router {
    let state = AppState::from_config(security).await.unwrap();
    let business = Router::new().route("/api/v1/clusters", get(ok).delete(ok));
    api::protect(business, &state).merge(api::router(state))
}

/// `GET uri` with optional extra headers.
pub fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::get(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
