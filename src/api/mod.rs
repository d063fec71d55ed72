// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface of the gateway.
//!
//! Public: health checks, the OpenID Connect login entry point and the API docs.
//! Everything else goes through authentication, then authorization, then
//! the handler (see [`protect`]).

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{self, UserInfo},
    authz,
    config::{ConfigError, SecurityConfig, API_BASE_PATH, API_DOCS_PATH, HEALTHZ_PATH, READINESS_PATH},
    http_security,
    state::AppState,
};

pub mod health;
pub mod login;
pub mod users;

/// Location of the generated OpenAPI document.
pub const OPENAPI_JSON_PATH: &str = "/api/v1/openapi.json";

/// Full application: routes, HTTP hardening, request ids and tracing.
pub fn app(state: AppState, security: &SecurityConfig) -> Result<Router, ConfigError> {
    let router = http_security::apply(router(state), security)?;
    // Outermost first: the id exists before the trace span opens.
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id());
    Ok(router.layer(layers))
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new().route(
        &format!("{API_BASE_PATH}/users/myprofile"),
        get(users::my_profile),
    );

    let mut public = Router::new()
        .route(HEALTHZ_PATH, get(health::liveness))
        .route(READINESS_PATH, get(health::readiness));
    if let Some(oidc) = state.authenticator.openid() {
        public = public.route(oidc.login_path(), get(login::oauth_login));
    }

    protect(protected, &state)
        .merge(public)
        .merge(SwaggerUi::new(API_DOCS_PATH).url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
        .with_state(state)
}

/// Put every route of `router` behind authentication and authorization.
///
/// Layers added later run first, so authentication wraps authorization.
pub fn protect<S>(router: Router<S>, state: &AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route_layer(from_fn_with_state(state.enforcer.clone(), authz::middleware::authorize))
        .route_layer(from_fn_with_state(
            state.authenticator.clone(),
            auth::middleware::authenticate,
        ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        users::my_profile,
        health::liveness,
        health::readiness,
        login::oauth_login
    ),
    components(
        schemas(
            UserInfo,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Users", description = "Authenticated principal"),
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Authentication", description = "OpenID Connect login")
    )
)]
struct ApiDoc;
