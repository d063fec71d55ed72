// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect login entry point.

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{IntoResponse, Redirect, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Start an OpenID Connect login.
///
/// Stores fresh `state` / `nonce` values in the session cookie and redirects
/// to the identity provider's authorization endpoint.
#[utoipa::path(
    get,
    path = "/oauth_login",
    tag = "Authentication",
    responses(
        (status = 307, description = "Redirect to the identity provider"),
        (status = 404, description = "OpenID Connect is not configured"),
    )
)]
pub async fn oauth_login(State(state): State<AppState>) -> Response {
    let Some(oidc) = state.authenticator.openid() else {
        return ApiError::not_found("OpenID Connect login is not configured").into_response();
    };

    match oidc.begin_login() {
        Ok(redirect) => {
            let mut response = Redirect::temporary(&redirect.location).into_response();
            response
                .headers_mut()
                .append(SET_COOKIE, redirect.session_cookie);
            response
        }
        Err(e) => e.into_response(),
    }
}
