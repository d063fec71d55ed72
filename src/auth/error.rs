// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! Every per-request failure of the pipeline is an [`AuthError`]. Responses
//! carry a JSON body `{"error": ..., "error_code": ...}`; messages never
//! include key material, upstream response bodies or verifier internals.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a token failed verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token issuer is invalid")]
    InvalidIssuer,
    #[error("token audience is invalid")]
    InvalidAudience,
    #[error("token algorithm is not accepted")]
    InvalidAlgorithm,
    #[error("no matching signing key found")]
    NoMatchingKey,
    #[error("signing keys are unavailable")]
    KeySetUnavailable,
}

impl TokenError {
    fn error_code(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed_token",
            TokenError::Expired => "token_expired",
            TokenError::NotYetValid => "token_not_yet_valid",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::InvalidIssuer => "invalid_issuer",
            TokenError::InvalidAudience => "invalid_audience",
            TokenError::InvalidAlgorithm => "invalid_algorithm",
            TokenError::NoMatchingKey => "no_matching_key",
            TokenError::KeySetUnavailable => "key_set_unavailable",
        }
    }
}

/// Per-request authentication / authorization failure.
#[derive(Debug)]
pub enum AuthError {
    /// Basic credentials missing or wrong
    BasicAuthRequired { realm: &'static str },
    /// No bearer token on the request
    MissingBearerToken,
    /// Authorization header present but unusable
    InvalidAuthHeader,
    /// Bearer token failed verification
    TokenRejected(TokenError),
    /// Roles/groups attribute path holds something other than a string array
    ClaimDecoding { path: String, reason: String },
    /// Token payload could not be decoded as JSON claims
    UndecodableToken,
    /// OIDC callback `state` does not match the session
    InvalidState,
    /// ID token `nonce` does not match the session
    InvalidNonce,
    /// Authorization code exchange failed (details logged)
    CodeExchange,
    /// Token endpoint response without `id_token`
    MissingIdToken,
    /// ID token failed verification
    IdTokenRejected(TokenError),
    /// Session cookie could not be written
    Session(String),
    /// Internal error
    Internal(String),
    /// No strategy established an identity
    Unauthenticated,
    /// Authorization ran without a security context
    MissingSecurityContext,
    /// Policy denied every role held by the caller
    AccessDenied,
    /// Policy denied and at least one role evaluation errored
    PolicyEvaluation(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::BasicAuthRequired { .. } => "basic_auth_required",
            AuthError::MissingBearerToken => "missing_bearer_token",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::TokenRejected(e) | AuthError::IdTokenRejected(e) => e.error_code(),
            AuthError::ClaimDecoding { .. } => "claim_decoding_error",
            AuthError::UndecodableToken => "undecodable_token",
            AuthError::InvalidState => "invalid_state",
            AuthError::InvalidNonce => "invalid_nonce",
            AuthError::CodeExchange => "code_exchange_failed",
            AuthError::MissingIdToken => "missing_id_token",
            AuthError::Session(_) => "session_error",
            AuthError::Internal(_) => "internal_error",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::MissingSecurityContext => "missing_security_context",
            AuthError::AccessDenied => "access_denied",
            AuthError::PolicyEvaluation(_) => "policy_evaluation_error",
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// Authorization denials are 401, not 403.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidState => StatusCode::BAD_REQUEST,
            AuthError::Session(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::BasicAuthRequired { .. } => write!(f, "Valid basic credentials are required"),
            AuthError::MissingBearerToken => write!(f, "Bearer token is required"),
            AuthError::InvalidAuthHeader => write!(f, "Invalid authorization header format"),
            AuthError::TokenRejected(e) => write!(f, "Invalid bearer token: {e}"),
            AuthError::ClaimDecoding { path, reason } => {
                write!(f, "Unable to decode claim '{path}': {reason}")
            }
            AuthError::UndecodableToken => write!(f, "Token payload is not a JSON object"),
            AuthError::InvalidState => write!(f, "Invalid state parameter"),
            AuthError::InvalidNonce => write!(f, "Invalid nonce"),
            AuthError::CodeExchange => write!(f, "Failed to exchange authorization code"),
            AuthError::MissingIdToken => write!(f, "No id_token field in token response"),
            AuthError::IdTokenRejected(e) => write!(f, "Failed to verify ID token: {e}"),
            AuthError::Session(msg) => write!(f, "Session error: {msg}"),
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {msg}"),
            AuthError::Unauthenticated => write!(f, "Authentication failed"),
            AuthError::MissingSecurityContext => write!(f, "No security context on request"),
            AuthError::AccessDenied => write!(f, "Unauthorized action"),
            AuthError::PolicyEvaluation(msg) => write!(f, "Unauthorized action: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let challenge = match &self {
            AuthError::BasicAuthRequired { realm } => {
                HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")).ok()
            }
            AuthError::MissingBearerToken | AuthError::TokenRejected(_) => {
                Some(HeaderValue::from_static("Bearer"))
            }
            _ => None,
        };
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if let Some(value) = challenge {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}
