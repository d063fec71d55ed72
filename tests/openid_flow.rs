// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect Authorization-Code flow against the in-process provider.

mod common;

use authgate_server::state::AppState;
use axum::{
    http::{header, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;

use common::{
    body_json, gateway, get_request, in_secs, security, sign, sign_with, MockIdp, CLIENT_ID,
    COOKIE_SECRET,
};

const PROFILE: &str = "/api/v1/users/myprofile";

fn openid_config(issuer: &str) -> String {
    format!(
        "authN:\n  provider: [openid]\n  openid:\n    clientId: {CLIENT_ID}\n    clientSecret: s3cret\n    issuerUri: {issuer}\n    redirectUri: http://localhost:8090{PROFILE}\n    cookieSecret: {COOKIE_SECRET}\n    scope: openid+email+profile\n    rolesAttributePath: realm_access.roles\n    groupsAttributePath: groups\n    cookieName: TEST_SESSION\n",
    )
}

async fn oidc_gateway(idp: &MockIdp) -> Router {
    gateway(&security(&openid_config(&idp.issuer))).await
}

/// A login that was started but not yet completed.
struct PendingLogin {
    cookie: String,
    state: String,
    nonce: String,
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn query_param(location: &Url, name: &str) -> String {
    location
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

async fn start_login(app: &Router) -> PendingLogin {
    let response = app
        .clone()
        .oneshot(get_request("/oauth_login", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap();
    PendingLogin {
        cookie: session_cookie(&response).unwrap(),
        state: query_param(&location, "state"),
        nonce: query_param(&location, "nonce"),
    }
}

fn token_response(idp: &MockIdp, nonce: &str) -> Value {
    let access_token = sign(&json!({
        "iss": idp.issuer,
        "sub": "alice-sub",
        "email": "alice@example.org",
        "name": "Alice",
        "exp": in_secs(300),
        "realm_access": { "roles": ["viewers"] },
        "groups": ["team1"],
    }));
    let id_token = sign(&json!({
        "iss": idp.issuer,
        "aud": CLIENT_ID,
        "sub": "alice-sub",
        "nonce": nonce,
        "exp": in_secs(300),
    }));
    json!({
        "access_token": access_token,
        "id_token": id_token,
        "token_type": "Bearer",
        "expires_in": 300,
    })
}

async fn callback(app: &Router, cookie: &str, state: &str) -> Response {
    app.clone()
        .oneshot(get_request(
            &format!("{PROFILE}?code=auth-code&state={state}"),
            &[("cookie", cookie)],
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn login_redirects_to_authorization_endpoint() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;

    let response = app
        .oneshot(get_request("/oauth_login", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap();
    assert!(location.as_str().starts_with(&format!("{}/auth?", idp.issuer)));
    assert_eq!(query_param(&location, "client_id"), CLIENT_ID);
    assert_eq!(query_param(&location, "response_type"), "code");
    assert_eq!(query_param(&location, "scope"), "openid email profile");
    assert_ne!(query_param(&location, "state"), query_param(&location, "nonce"));

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("TEST_SESSION="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains("Secure"));
}

#[tokio::test]
async fn anonymous_request_is_redirected() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;

    let response = app.oneshot(get_request(PROFILE, &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(session_cookie(&response).is_some());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("{}/auth?", idp.issuer)));
}

#[tokio::test]
async fn callback_completes_login_and_session_is_reused() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;
    let login = start_login(&app).await;
    idp.set_token_response(token_response(&idp, &login.nonce));

    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::OK);
    let authenticated_cookie = session_cookie(&response).unwrap();
    let body = body_json(response).await;
    assert_eq!(body["email"], "alice@example.org");
    assert_eq!(body["roles"], json!(["viewers"]));
    assert_eq!(body["groups"], json!(["team1"]));
    assert_eq!(idp.token_hits(), 1);

    let response = app
        .oneshot(get_request(PROFILE, &[("cookie", &authenticated_cookie)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["subject"], "alice-sub");
    assert_eq!(idp.token_hits(), 1);
}

#[tokio::test]
async fn state_mismatch_is_bad_request() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;
    let login = start_login(&app).await;
    idp.set_token_response(token_response(&idp, &login.nonce));

    let response = callback(&app, &login.cookie, "forged-state").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(idp.token_hits(), 0);
}

#[tokio::test]
async fn callback_without_pending_login_is_bad_request() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;

    let response = app
        .oneshot(get_request(&format!("{PROFILE}?code=c&state=s"), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn replayed_callback_fails_after_new_login() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;

    let first = start_login(&app).await;
    idp.set_token_response(token_response(&idp, &first.nonce));
    let response = callback(&app, &first.cookie, &first.state).await;
    assert_eq!(response.status(), StatusCode::OK);

    let second = start_login(&app).await;
    let response = callback(&app, &second.cookie, &first.state).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn nonce_mismatch_is_rejected() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;
    let login = start_login(&app).await;
    idp.set_token_response(token_response(&idp, "another-nonce"));

    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn failed_callback_keeps_pending_login() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;
    let login = start_login(&app).await;

    idp.set_token_response(token_response(&idp, "another-nonce"));
    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    idp.set_token_response(token_response(&idp, &login.nonce));
    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_id_token_is_rejected() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;
    let login = start_login(&app).await;
    let mut tokens = token_response(&idp, &login.nonce);
    tokens.as_object_mut().unwrap().remove("id_token");
    idp.set_token_response(tokens);

    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "No id_token field in token response");
}

fn id_token_claims(idp: &MockIdp, nonce: &str) -> Value {
    json!({
        "iss": idp.issuer,
        "aud": CLIENT_ID,
        "sub": "alice-sub",
        "nonce": nonce,
        "exp": in_secs(300),
    })
}

/// Run a callback whose token response carries `id_token`; the result must be
/// a 401 that leaves the session alone.
async fn assert_id_token_rejected(
    idp: &MockIdp,
    error_code: &str,
    id_token: impl FnOnce(&str) -> String,
) {
    let app = oidc_gateway(idp).await;
    let login = start_login(&app).await;
    let mut tokens = token_response(idp, &login.nonce);
    tokens["id_token"] = json!(id_token(&login.nonce));
    idp.set_token_response(tokens);

    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_json(response).await["error_code"], error_code);
}

#[tokio::test]
async fn id_token_with_foreign_signature_is_rejected() {
    let idp = MockIdp::start().await;
    assert_id_token_rejected(&idp, "invalid_signature", |nonce| {
        sign_with(
            &id_token_claims(&idp, nonce),
            b"someone-else-signing-secret-000000000",
        )
    })
    .await;
}

#[tokio::test]
async fn id_token_with_wrong_issuer_is_rejected() {
    let idp = MockIdp::start().await;
    assert_id_token_rejected(&idp, "invalid_issuer", |nonce| {
        let mut claims = id_token_claims(&idp, nonce);
        claims["iss"] = json!("https://elsewhere.example.org");
        sign(&claims)
    })
    .await;
}

#[tokio::test]
async fn id_token_without_audience_is_rejected() {
    let idp = MockIdp::start().await;
    assert_id_token_rejected(&idp, "invalid_audience", |nonce| {
        let mut claims = id_token_claims(&idp, nonce);
        claims.as_object_mut().unwrap().remove("aud");
        sign(&claims)
    })
    .await;
}

#[tokio::test]
async fn id_token_without_issuer_is_rejected() {
    let idp = MockIdp::start().await;
    assert_id_token_rejected(&idp, "invalid_issuer", |nonce| {
        let mut claims = id_token_claims(&idp, nonce);
        claims.as_object_mut().unwrap().remove("iss");
        sign(&claims)
    })
    .await;
}

#[tokio::test]
async fn opaque_access_token_is_rejected() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;
    let login = start_login(&app).await;
    let mut tokens = token_response(&idp, &login.nonce);
    tokens["access_token"] = json!("opaque-reference-token");
    idp.set_token_response(tokens);

    let response = callback(&app, &login.cookie, &login.state).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_session_cookie_starts_a_new_login() {
    let idp = MockIdp::start().await;
    let app = oidc_gateway(&idp).await;

    let response = app
        .oneshot(get_request(PROFILE, &[("cookie", "TEST_SESSION=not-a-valid-session")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn discovery_requires_exact_issuer() {
    let idp = MockIdp::start().await;
    let config = security(&openid_config(&format!("{}/", idp.issuer)));
    assert!(AppState::from_config(&config).await.is_err());
}
