// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::Json;

use crate::auth::{Auth, UserInfo};

/// Get the current authenticated user's information.
///
/// Returns the identity, roles and groups resolved by the authentication
/// pipeline for this request.
#[utoipa::path(
    get,
    path = "/api/v1/users/myprofile",
    tag = "Users",
    responses(
        (status = 200, description = "User information", body = UserInfo),
        (status = 401, description = "Unauthenticated or not permitted"),
    )
)]
pub async fn my_profile(Auth(ctx): Auth) -> Json<UserInfo> {
    Json(ctx.user().clone())
}
