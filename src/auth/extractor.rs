// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request security context and the Axum extractor that reads it.
//!
//! The authentication middleware stores a [`SecurityContext`] in the request
//! extensions; the authorization middleware adds its [`Decision`]. Handlers
//! read it with the `Auth` extractor:
//!
//! ```rust,ignore
//! async fn my_profile(Auth(ctx): Auth) -> Json<UserInfo> {
//!     Json(ctx.user().clone())
//! }
//! ```

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, UserInfo};
use crate::authz::Decision;

/// The authenticated principal of a request plus the authorization outcome.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    user: Arc<UserInfo>,
    decision: Option<Decision>,
}

impl SecurityContext {
    pub fn new(user: UserInfo) -> Self {
        Self {
            user: Arc::new(user),
            decision: None,
        }
    }

    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    /// Authorization outcome, once the policy step has run.
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// Extractor for the request's security context.
///
/// Rejects with 401 when the route is not behind the authentication
/// middleware.
pub struct Auth(pub SecurityContext);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .map(Auth)
            .ok_or(AuthError::Unauthenticated)
    }
}
