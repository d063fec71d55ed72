// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stateless Bearer (JWT) authentication.
//!
//! The token is verified against the configured issuer's JWKS; roles and
//! groups come from the configured attribute paths, `name`/`email`/`sub`
//! from the standard claims. No session, no redirect.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::{debug, error, warn};

use super::jwks::JwksManager;
use super::verifier::TokenVerifier;
use super::{AuthError, UserInfo};
use crate::config::BearerConfig;

pub struct BearerProvider {
    verifier: TokenVerifier,
    roles_path: String,
    groups_path: String,
}

impl BearerProvider {
    pub fn new(config: &BearerConfig, client: reqwest::Client) -> Self {
        let jwks = JwksManager::new(config.jwks_url.clone(), client);

        let issuer = if config.skip_issuer_check {
            warn!(issuer = %config.issuer_uri, "Bearer issuer check is disabled");
            None
        } else {
            Some(config.issuer_uri.clone())
        };

        let mut verifier = TokenVerifier::new(jwks, issuer, config.audience.clone());
        if config.skip_signature_check {
            error!("Bearer signature check is disabled: any well-formed token will be accepted");
            verifier = verifier.insecure_skip_signature_check();
        }

        Self {
            verifier,
            roles_path: config.roles_attribute_path.clone(),
            groups_path: config.groups_attribute_path.clone(),
        }
    }

    pub fn jwks(&self) -> &JwksManager {
        self.verifier.jwks()
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<UserInfo, AuthError> {
        let token = bearer_token(headers)?;

        let claims = self.verifier.verify(token).await.map_err(|e| {
            warn!(reason = %e, "Bearer token rejected");
            AuthError::TokenRejected(e)
        })?;

        let user = UserInfo::from_claims(&claims, &self.roles_path, &self.groups_path)?;
        debug!(user = %user.display_id(), roles = ?user.roles, "Bearer authentication succeeded");
        Ok(user)
    }
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingBearerToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let header = header.trim();
    let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingBearerToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extracts_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(&headers("bearer  abc ")).unwrap(), "abc");
    }

    #[test]
    fn absent_or_blank_token_is_missing() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingBearerToken)
        ));
        assert!(matches!(
            bearer_token(&headers("Bearer   ")),
            Err(AuthError::MissingBearerToken)
        ));
    }

    #[test]
    fn other_scheme_is_invalid() {
        assert!(matches!(
            bearer_token(&headers("Basic ZGV2MTpwYXNzVyE=")),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&headers("Token")),
            Err(AuthError::InvalidAuthHeader)
        ));
    }
}
