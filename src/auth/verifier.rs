// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT verification against a JWKS-backed issuer.
//!
//! Shared by the Bearer strategy (access tokens) and the OpenID Connect
//! strategy (ID tokens). Signature, `exp` and `nbf` are always validated
//! unless the signature check is explicitly disabled; the issuer is checked
//! whenever one is configured, the audience only when one is configured.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde_json::Value;
use tracing::warn;

use super::error::TokenError;
use super::jwks::JwksManager;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Token verifier bound to one issuer and key set.
#[derive(Clone)]
pub struct TokenVerifier {
    jwks: JwksManager,
    /// Expected `iss`; `None` disables the issuer check
    issuer: Option<String>,
    /// Expected `aud`; `None` disables the audience check
    audience: Option<String>,
    skip_signature_check: bool,
}

impl TokenVerifier {
    pub fn new(jwks: JwksManager, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            jwks,
            issuer,
            audience,
            skip_signature_check: false,
        }
    }

    /// Accept tokens without checking their signature. Test/dev only.
    pub fn insecure_skip_signature_check(mut self) -> Self {
        self.skip_signature_check = true;
        self
    }

    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    /// Verify `token` and return its claims.
    pub async fn verify(&self, token: &str) -> Result<Value, TokenError> {
        if self.skip_signature_check {
            return self.verify_unsigned(token);
        }

        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        let decoding_key = self
            .jwks
            .decoding_key(header.kid.as_deref(), header.alg)
            .await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_nbf = true;

        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = self.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        // Configured issuer/audience must be present, not just consistent when present.
        let mut required = vec!["exp"];
        if self.issuer.is_some() {
            required.push("iss");
        }
        if self.audience.is_some() {
            required.push("aud");
        }
        validation.set_required_spec_claims(&required);

        let token_data = decode::<Value>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            ErrorKind::InvalidAudience => TokenError::InvalidAudience,
            ErrorKind::InvalidAlgorithm => TokenError::InvalidAlgorithm,
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => TokenError::InvalidIssuer,
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => TokenError::InvalidAudience,
            _ => TokenError::Malformed,
        })?;

        Ok(token_data.claims)
    }

    /// Development verification: claims are checked, the signature is not.
    fn verify_unsigned(&self, token: &str) -> Result<Value, TokenError> {
        warn!("Accepting token without signature verification (skipSignatureCheck is enabled)");

        let token_data = jsonwebtoken::dangerous::insecure_decode::<Value>(token)
            .map_err(|_| TokenError::Malformed)?;
        let claims = token_data.claims;
        let now = chrono::Utc::now().timestamp();
        let leeway = CLOCK_SKEW_LEEWAY as i64;

        let exp = claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(TokenError::Malformed)?;
        if exp + leeway < now {
            return Err(TokenError::Expired);
        }
        if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
            if nbf - leeway > now {
                return Err(TokenError::NotYetValid);
            }
        }
        if let Some(ref issuer) = self.issuer {
            if claims.get("iss").and_then(Value::as_str) != Some(issuer.as_str()) {
                return Err(TokenError::InvalidIssuer);
            }
        }
        if let Some(ref audience) = self.audience {
            let matches = match claims.get("aud") {
                Some(Value::String(aud)) => aud == audience,
                Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(audience.as_str())),
                _ => false,
            };
            if !matches {
                return Err(TokenError::InvalidAudience);
            }
        }

        Ok(claims)
    }
}
