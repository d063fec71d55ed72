// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization middleware: evaluates the caller's roles against the policy.
//!
//! Must run after [`crate::auth::middleware::authenticate`]. Denials are 401.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::enforcer::{Decision, PolicyEnforcer};
use crate::auth::{AuthError, SecurityContext};

pub async fn authorize(
    State(enforcer): State<Arc<PolicyEnforcer>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(ctx) = request.extensions_mut().remove::<SecurityContext>() else {
        warn!("Unable to authorize request, no security context found");
        return AuthError::MissingSecurityContext.into_response();
    };

    // Nested routers see a stripped URI; policies are written against the full path.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().as_str().to_string();

    let decision = enforcer.authorize(&ctx.user().roles, &path, &method).await;
    match &decision {
        Decision::Allow { .. } => {}
        Decision::Deny { errors } if !errors.is_empty() => {
            let message = errors.join("; ");
            warn!(
                user = %ctx.user().display_id(),
                email = ?ctx.user().email,
                subject = ?ctx.user().subject,
                path = %path,
                method = %method,
                error = %message,
                "Unable to authorize user"
            );
            return AuthError::PolicyEvaluation(message).into_response();
        }
        Decision::Deny { .. } => {
            warn!(
                user = %ctx.user().display_id(),
                email = ?ctx.user().email,
                subject = ?ctx.user().subject,
                path = %path,
                method = %method,
                "User not allowed to execute the action"
            );
            return AuthError::AccessDenied.into_response();
        }
    }

    request.extensions_mut().insert(ctx.with_decision(decision));
    next.run(request).await
}
