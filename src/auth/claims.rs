// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The resolved principal ([`UserInfo`]) and role/group extraction from
//! token claims.
//!
//! ## Attribute paths
//!
//! Roles and groups live in different places depending on the identity
//! provider (`realm_access.roles` for Keycloak, `groups` for most others).
//! A path is a dot-separated list of object keys; a numeric segment indexes
//! into an array (`resource_access.account.roles`, `memberships.0.roles`).
//!
//! - absent field (or explicit `null`) → empty set
//! - anything other than an array of strings → [`AuthError::ClaimDecoding`]

use std::collections::BTreeSet;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::AuthError;

/// The authenticated caller of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    /// Login name (Basic authentication only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// Display name (`name` claim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address (`email` claim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Stable identity at the issuer (`sub` claim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl UserInfo {
    /// Principal for a static credential: login and roles only.
    pub fn from_login<I, S>(login: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            login: Some(login.into()),
            roles: roles.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Build a principal from decoded token claims.
    ///
    /// `name`, `email` and `sub` are copied when they are strings; roles and
    /// groups come from the configured attribute paths.
    pub fn from_claims(claims: &Value, roles_path: &str, groups_path: &str) -> Result<Self, AuthError> {
        if !claims.is_object() {
            return Err(AuthError::UndecodableToken);
        }
        let string_claim = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            login: None,
            name: string_claim("name"),
            email: string_claim("email"),
            subject: string_claim("sub"),
            roles: extract_attribute(claims, roles_path)?,
            groups: extract_attribute(claims, groups_path)?,
        })
    }

    /// Best human-readable identifier, for logs.
    pub fn display_id(&self) -> &str {
        self.login
            .as_deref()
            .or(self.email.as_deref())
            .or(self.subject.as_deref())
            .unwrap_or("<anonymous>")
    }
}

/// Resolve `path` inside `claims` to a set of strings.
pub fn extract_attribute(claims: &Value, path: &str) -> Result<BTreeSet<String>, AuthError> {
    let path = path.trim();
    if path.is_empty() {
        return Ok(BTreeSet::new());
    }

    let mut current = claims;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(BTreeSet::new()),
        }
    }

    match current {
        Value::Null => Ok(BTreeSet::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| AuthError::ClaimDecoding {
                    path: path.to_string(),
                    reason: format!("expected an array of strings, found element {item}"),
                })
            })
            .collect(),
        other => Err(AuthError::ClaimDecoding {
            path: path.to_string(),
            reason: format!("expected an array of strings, found {}", json_kind(other)),
        }),
    }
}

/// Decode the payload segment of a JWT without verifying it.
///
/// Only for tokens whose authenticity is already established by another
/// channel (the access token returned alongside a verified ID token).
pub fn decode_unverified_payload(token: &str) -> Result<Value, AuthError> {
    let payload = token.split('.').nth(1).ok_or(AuthError::UndecodableToken)?;
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('='))
        .map_err(|_| AuthError::UndecodableToken)?;
    let claims: Value = serde_json::from_slice(&bytes).map_err(|_| AuthError::UndecodableToken)?;
    if claims.is_object() {
        Ok(claims)
    } else {
        Err(AuthError::UndecodableToken)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
