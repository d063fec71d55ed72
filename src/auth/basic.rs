// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP Basic authentication against the static credential table.
//!
//! Logins are matched exactly (case-sensitive). Passwords are compared in
//! constant time, and an unknown login still pays for one comparison so the
//! response time does not reveal which logins exist.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64ct::{Base64, Encoding};
use tracing::debug;

use super::security::constant_time_eq;
use super::{AuthError, UserInfo};
use crate::config::BasicCredential;

/// Realm announced in the `WWW-Authenticate` challenge.
pub const BASIC_REALM: &str = "Authorization Required";

struct CredentialEntry {
    login: String,
    password: String,
    roles: Vec<String>,
}

/// Credential store loaded once at startup.
pub struct BasicProvider {
    entries: Vec<CredentialEntry>,
}

impl BasicProvider {
    pub fn new(credentials: &[BasicCredential]) -> Self {
        let entries = credentials
            .iter()
            .map(|c| CredentialEntry {
                login: c.login.clone(),
                password: c.password.clone(),
                roles: c.roles.clone(),
            })
            .collect();
        Self { entries }
    }

    /// Number of configured logins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Authenticate the `Authorization: Basic` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<UserInfo, AuthError> {
        let challenge = || AuthError::BasicAuthRequired { realm: BASIC_REALM };

        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(challenge)?;
        let (login, password) = parse_basic_header(header).ok_or_else(challenge)?;

        match self.entries.iter().find(|entry| entry.login == login) {
            Some(entry) if constant_time_eq(password.as_bytes(), entry.password.as_bytes()) => {
                debug!(login = %entry.login, "Basic authentication succeeded");
                Ok(UserInfo::from_login(entry.login.clone(), entry.roles.iter().cloned()))
            }
            Some(_) => Err(challenge()),
            None => {
                let _ = constant_time_eq(password.as_bytes(), b"\0unknown-login\0");
                Err(challenge())
            }
        }
    }
}

/// Split a `Basic <base64(login:password)>` header value.
fn parse_basic_header(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = Base64::decode_vec(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn provider() -> BasicProvider {
        let credentials: Vec<BasicCredential> = serde_yaml::from_str(
            r#"
- login: dev1
  password: "passW!"
  roles: [developers]
- login: admin
  password: "adm:in"
  roles: [admins, developers]
"#,
        )
        .unwrap();
        BasicProvider::new(&credentials)
    }

    fn headers(login: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode(format!("{login}:{password}"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[test]
    fn correct_credentials_yield_configured_roles() {
        let user = provider().authenticate(&headers("dev1", "passW!")).unwrap();
        assert_eq!(user.login.as_deref(), Some("dev1"));
        assert_eq!(user.roles.iter().collect::<Vec<_>>(), vec!["developers"]);
        assert!(user.name.is_none());
        assert!(user.email.is_none());
        assert!(user.subject.is_none());
    }

    #[test]
    fn password_may_contain_colons() {
        let user = provider().authenticate(&headers("admin", "adm:in")).unwrap();
        assert_eq!(user.roles.len(), 2);
    }

    #[test]
    fn wrong_password_is_rejected() {
        for password in ["passw!", "passW", "passW!!", ""] {
            let err = provider().authenticate(&headers("dev1", password)).unwrap_err();
            assert!(matches!(err, AuthError::BasicAuthRequired { .. }));
        }
    }

    #[test]
    fn login_is_case_sensitive() {
        assert!(provider().authenticate(&headers("DEV1", "passW!")).is_err());
        assert!(provider().authenticate(&headers("nobody", "passW!")).is_err());
    }

    #[test]
    fn missing_or_foreign_header_is_rejected() {
        assert!(provider().authenticate(&HeaderMap::new()).is_err());

        let mut bearer = HeaderMap::new();
        bearer.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert!(provider().authenticate(&bearer).is_err());

        let mut garbage = HeaderMap::new();
        garbage.insert(AUTHORIZATION, HeaderValue::from_static("Basic %%%"));
        assert!(provider().authenticate(&garbage).is_err());
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("dev1:passW!");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("basic {encoded}")).unwrap(),
        );
        assert!(provider().authenticate(&headers).is_ok());
    }
}
