// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect session state and its encrypted cookie codec.
//!
//! ## Cookie format
//!
//! `base64url(nonce[12] || AES-256-GCM(json(session + exp)))`, with the cookie
//! name as associated data so a value cannot be replayed under another name.
//! The key is the SHA-256 digest of the configured cookie secret.
//!
//! Anything that fails to decode, decrypt or is past its expiry loads as an
//! empty session; the caller then simply starts a new login.

use std::time::Duration;

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use base64ct::{Base64UrlUnpadded, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{AuthError, UserInfo};
use crate::config::ConfigError;

/// Minimum accepted length of the cookie secret, in bytes.
pub const MIN_COOKIE_SECRET_LEN: usize = 32;

/// Browsers drop cookies larger than this.
const MAX_COOKIE_LEN: usize = 4096;

/// Per-caller OIDC session.
///
/// Holds either a pending login (`state` + `nonce`) or an authenticated
/// principal, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_info: Option<UserInfo>,
}

impl Session {
    /// Session for a login that has just been redirected to the provider.
    pub fn pending_login(state: String, nonce: String) -> Self {
        Self {
            state: Some(state),
            nonce: Some(nonce),
            user_info: None,
        }
    }

    /// Stored `state` and `nonce`, if a login is in flight.
    pub fn pending(&self) -> Option<(&str, &str)> {
        Some((self.state.as_deref()?, self.nonce.as_deref()?))
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    /// Record the authenticated principal; the login values are consumed.
    pub fn set_user_info(&mut self, user: UserInfo) {
        self.state = None;
        self.nonce = None;
        self.user_info = Some(user);
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.nonce.is_none() && self.user_info.is_none()
    }
}

/// Where sessions live between requests.
pub trait SessionStore: Send + Sync {
    /// Session carried by the request, or an empty one.
    fn load(&self, headers: &HeaderMap) -> Session;

    /// Persist `session`, returning the `Set-Cookie` header value.
    fn save(&self, session: &Session) -> Result<HeaderValue, AuthError>;
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    session: Session,
    exp: i64,
}

/// Session store backed by an AES-256-GCM encrypted cookie.
pub struct CookieSessionStore {
    name: String,
    key: LessSafeKey,
    rng: SystemRandom,
    max_age: Duration,
    secure: bool,
}

impl CookieSessionStore {
    pub fn new(
        name: impl Into<String>,
        secret: &str,
        max_age: Duration,
        secure: bool,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err(ConfigError::Invalid {
                field: "security.authN.openid.cookieName",
                reason: "must be a non-empty token of [A-Za-z0-9_-]".to_string(),
            });
        }
        if secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(ConfigError::Invalid {
                field: "security.authN.openid.cookieSecret",
                reason: format!("must be at least {MIN_COOKIE_SECRET_LEN} bytes"),
            });
        }

        let digest = Sha256::digest(secret.as_bytes());
        let key = UnboundKey::new(&AES_256_GCM, &digest).map_err(|_| ConfigError::Invalid {
            field: "security.authN.openid.cookieSecret",
            reason: "unable to derive encryption key".to_string(),
        })?;

        Ok(Self {
            name,
            key: LessSafeKey::new(key),
            rng: SystemRandom::new(),
            max_age,
            secure,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.name
    }

    fn cookie_value<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.trim_matches('"'))
    }

    fn seal(&self, plaintext: Vec<u8>) -> Result<String, AuthError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AuthError::Session("system random source failed".to_string()))?;

        let mut in_out = plaintext;
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(self.name.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| AuthError::Session("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(Base64UrlUnpadded::encode_string(&sealed))
    }

    fn open(&self, value: &str) -> Option<Vec<u8>> {
        let mut sealed = Base64UrlUnpadded::decode_vec(value).ok()?;
        if sealed.len() <= NONCE_LEN {
            return None;
        }
        let mut ciphertext = sealed.split_off(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&sealed).ok()?;
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(self.name.as_bytes()), &mut ciphertext)
            .ok()?;
        Some(plaintext.to_vec())
    }
}

impl SessionStore for CookieSessionStore {
    fn load(&self, headers: &HeaderMap) -> Session {
        let Some(value) = self.cookie_value(headers) else {
            return Session::default();
        };
        let Some(plaintext) = self.open(value) else {
            debug!(cookie = %self.name, "Discarding undecryptable session cookie");
            return Session::default();
        };
        match serde_json::from_slice::<Envelope>(&plaintext) {
            Ok(envelope) if envelope.exp > chrono::Utc::now().timestamp() => envelope.session,
            Ok(_) => {
                debug!(cookie = %self.name, "Discarding expired session cookie");
                Session::default()
            }
            Err(_) => Session::default(),
        }
    }

    fn save(&self, session: &Session) -> Result<HeaderValue, AuthError> {
        let max_age = self.max_age.as_secs();
        let envelope = Envelope {
            session: session.clone(),
            exp: chrono::Utc::now().timestamp() + max_age as i64,
        };
        let plaintext = serde_json::to_vec(&envelope).map_err(|e| AuthError::Session(e.to_string()))?;
        let value = self.seal(plaintext)?;

        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        if cookie.len() > MAX_COOKIE_LEN {
            warn!(
                cookie = %self.name,
                size = cookie.len(),
                "Session cookie exceeds 4096 bytes and may be dropped by browsers"
            );
        }
        HeaderValue::from_str(&cookie).map_err(|e| AuthError::Session(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn store() -> CookieSessionStore {
        CookieSessionStore::new("AUTHGATE_OIDC_SESSION", SECRET, Duration::from_secs(600), true).unwrap()
    }

    /// Turn a `Set-Cookie` value into the matching request `Cookie` header.
    fn request_headers(set_cookie: &HeaderValue) -> HeaderMap {
        let pair = set_cookie.to_str().unwrap().split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("other=1; {pair}")).unwrap());
        headers
    }

    #[test]
    fn saved_session_loads_back() {
        let store = store();
        let session = Session::pending_login("S1".into(), "N1".into());
        let set_cookie = store.save(&session).unwrap();

        let attributes = set_cookie.to_str().unwrap();
        assert!(attributes.contains("HttpOnly"));
        assert!(attributes.contains("SameSite=Lax"));
        assert!(attributes.contains("Secure"));
        assert!(attributes.contains("Max-Age=600"));

        let loaded = store.load(&request_headers(&set_cookie));
        assert_eq!(loaded.pending(), Some(("S1", "N1")));
    }

    #[test]
    fn storing_user_consumes_login_values() {
        let mut session = Session::pending_login("S1".into(), "N1".into());
        session.set_user_info(UserInfo::from_login("dev1", ["developers"]));
        assert!(session.pending().is_none());
        assert_eq!(session.user_info().unwrap().login.as_deref(), Some("dev1"));
    }

    #[test]
    fn tampered_cookie_loads_empty() {
        let store = store();
        let set_cookie = store.save(&Session::pending_login("S1".into(), "N1".into())).unwrap();
        let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
        let (name, value) = pair.split_once('=').unwrap();
        let mut bytes = value.as_bytes().to_vec();
        let middle = bytes.len() / 2;
        bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
        let tampered = format!("{name}={}", String::from_utf8(bytes).unwrap());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&tampered).unwrap());
        assert!(store.load(&headers).is_empty());
    }

    #[test]
    fn cookie_from_another_secret_loads_empty() {
        let set_cookie = store().save(&Session::pending_login("S1".into(), "N1".into())).unwrap();
        let other = CookieSessionStore::new(
            "AUTHGATE_OIDC_SESSION",
            "ffffffffffffffffffffffffffffffff",
            Duration::from_secs(600),
            true,
        )
        .unwrap();
        assert!(other.load(&request_headers(&set_cookie)).is_empty());
    }

    #[test]
    fn expired_cookie_loads_empty() {
        let store =
            CookieSessionStore::new("AUTHGATE_OIDC_SESSION", SECRET, Duration::from_secs(0), false).unwrap();
        let set_cookie = store.save(&Session::pending_login("S1".into(), "N1".into())).unwrap();
        assert!(!set_cookie.to_str().unwrap().contains("Secure"));
        assert!(store.load(&request_headers(&set_cookie)).is_empty());
    }

    #[test]
    fn missing_cookie_loads_empty() {
        assert!(store().load(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = CookieSessionStore::new("s", "too-short", Duration::from_secs(60), true);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
