// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenID Connect Authorization-Code flow.
//!
//! ## States
//!
//! ```text
//! Anonymous ──login──▶ AwaitingCallback ──callback──▶ Authenticated
//!     ▲                      │ (state/nonce in session)     │ (UserInfo in session)
//!     └──────── failure ─────┘                              │
//! ```
//!
//! - **Anonymous**: fresh `state` and `nonce` are stored in the session and the
//!   caller is redirected (307) to the authorization endpoint.
//! - **AwaitingCallback**: the provider redirects back with `code` and `state`.
//!   `state` must equal the stored value (400 otherwise), the code is exchanged,
//!   the ID token is verified and its `nonce` must equal the stored value.
//!   Roles and groups come from the access token.
//! - **Authenticated**: the session's `UserInfo` is accepted as is.
//!
//! A failed callback writes nothing. The stored pair stays bound to the login
//! that issued it and is replaced by the next login, so a replayed callback
//! URL cannot succeed once a new login has started.

use std::sync::Arc;

use axum::http::request::Parts;
use ring::rand::SystemRandom;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::jwks::JwksManager;
use super::middleware::AuthOutcome;
use super::security::{constant_time_eq, random_token};
use super::session::{CookieSessionStore, Session, SessionStore};
use super::verifier::TokenVerifier;
use super::{claims, AuthError, UserInfo};
use crate::config::{ConfigError, OpenIdConfig};

/// Subset of the provider's discovery document that the flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

/// A login redirect: where to send the browser and the session that goes with it.
#[derive(Debug)]
pub struct LoginRedirect {
    pub location: String,
    pub session_cookie: axum::http::HeaderValue,
}

pub struct OidcProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authorization_endpoint: Url,
    token_endpoint: String,
    verifier: TokenVerifier,
    http: reqwest::Client,
    sessions: Arc<dyn SessionStore>,
    rng: SystemRandom,
    roles_path: String,
    groups_path: String,
    login_path: String,
}

impl OidcProvider {
    /// Fetch the provider's discovery document and build the strategy.
    pub async fn discover(config: &OpenIdConfig, http: reqwest::Client) -> Result<Self, ConfigError> {
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            config.issuer_uri.trim_end_matches('/')
        );
        let discovery_error = |reason: String| ConfigError::Discovery {
            issuer: config.issuer_uri.clone(),
            reason,
        };

        let response = http
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(discovery_error(format!(
                "HTTP {} from {discovery_url}",
                response.status()
            )));
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        if metadata.issuer != config.issuer_uri {
            return Err(discovery_error(format!(
                "discovery document advertises issuer {}",
                metadata.issuer
            )));
        }

        let sessions = CookieSessionStore::new(
            config.cookie_name.clone(),
            &config.cookie_secret,
            config.session_max_age(),
            config.redirect_uri.starts_with("https://"),
        )?;

        info!(
            issuer = %metadata.issuer,
            authorization_endpoint = %metadata.authorization_endpoint,
            "OpenID Connect provider discovered"
        );
        Self::from_metadata(config, metadata, http, Arc::new(sessions))
    }

    /// Build the strategy from already known provider metadata.
    pub fn from_metadata(
        config: &OpenIdConfig,
        metadata: ProviderMetadata,
        http: reqwest::Client,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigError> {
        let authorization_endpoint =
            Url::parse(&metadata.authorization_endpoint).map_err(|e| ConfigError::Discovery {
                issuer: metadata.issuer.clone(),
                reason: format!("invalid authorization_endpoint: {e}"),
            })?;

        let jwks = JwksManager::new(metadata.jwks_uri.clone(), http.clone());
        let verifier = TokenVerifier::new(jwks, Some(metadata.issuer.clone()), Some(config.client_id.clone()));

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes(),
            authorization_endpoint,
            token_endpoint: metadata.token_endpoint,
            verifier,
            http,
            sessions,
            rng: SystemRandom::new(),
            roles_path: config.roles_attribute_path.clone(),
            groups_path: config.groups_attribute_path.clone(),
            login_path: config.login_path.clone(),
        })
    }

    /// Path of the public login entry point.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn jwks(&self) -> &JwksManager {
        self.verifier.jwks()
    }

    /// Authorization endpoint URL carrying `state` and `nonce`.
    pub fn authorization_url(&self, state: &str, nonce: &str) -> Url {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        url
    }

    /// Start a login: fresh session holding only the new `state` / `nonce`.
    pub fn begin_login(&self) -> Result<LoginRedirect, AuthError> {
        let state = random_token(&self.rng)?;
        let nonce = random_token(&self.rng)?;
        let location = self.authorization_url(&state, &nonce).to_string();
        let session_cookie = self.sessions.save(&Session::pending_login(state, nonce))?;
        debug!("Redirecting to the OpenID Connect authorization endpoint");
        Ok(LoginRedirect {
            location,
            session_cookie,
        })
    }

    /// Run the strategy for one request.
    pub async fn authenticate(&self, parts: &Parts) -> Result<AuthOutcome, AuthError> {
        let mut session = self.sessions.load(&parts.headers);

        if let Some(user) = session.user_info() {
            debug!(
                email = ?user.email,
                subject = ?user.subject,
                "User already authenticated by session"
            );
            return Ok(AuthOutcome::Authenticated {
                user: user.clone(),
                session_cookie: None,
            });
        }

        let mut code = None;
        let mut state = None;
        if let Some(query) = parts.uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "code" => code = Some(value.into_owned()),
                    "state" => state = Some(value.into_owned()),
                    _ => {}
                }
            }
        }

        match state {
            Some(state) => {
                let user = self
                    .complete_login(&mut session, code.as_deref().unwrap_or_default(), &state)
                    .await?;
                let session_cookie = self.sessions.save(&session)?;
                Ok(AuthOutcome::Authenticated {
                    user,
                    session_cookie: Some(session_cookie),
                })
            }
            None => {
                let redirect = self.begin_login()?;
                Ok(AuthOutcome::Redirect {
                    location: redirect.location,
                    session_cookie: redirect.session_cookie,
                })
            }
        }
    }

    /// Handle the provider callback. On success the session's login values
    /// are replaced by the principal; on failure the session is untouched.
    pub async fn complete_login(
        &self,
        session: &mut Session,
        code: &str,
        state: &str,
    ) -> Result<UserInfo, AuthError> {
        let (expected_state, expected_nonce) = session.pending().ok_or_else(|| {
            warn!("OAuth2 callback without a pending login");
            AuthError::InvalidState
        })?;
        if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
            warn!("Invalid OAuth2 state on callback");
            return Err(AuthError::InvalidState);
        }
        let expected_nonce = expected_nonce.to_string();

        let tokens = self.exchange_code(code).await?;

        let raw_id_token = tokens.id_token.ok_or_else(|| {
            warn!("No id_token field in the OAuth2 token response");
            AuthError::MissingIdToken
        })?;
        let id_claims = self.verifier.verify(&raw_id_token).await.map_err(|e| {
            warn!(reason = %e, "Failed to verify the ID token");
            AuthError::IdTokenRejected(e)
        })?;

        let nonce = id_claims.get("nonce").and_then(Value::as_str).unwrap_or_default();
        if !constant_time_eq(nonce.as_bytes(), expected_nonce.as_bytes()) {
            warn!("Invalid OAuth2 nonce in ID token");
            return Err(AuthError::InvalidNonce);
        }

        let access_claims = claims::decode_unverified_payload(&tokens.access_token).map_err(|_| {
            warn!("Access token is not a decodable JWT");
            AuthError::ClaimDecoding {
                path: "access_token".to_string(),
                reason: "access token is not a JWT".to_string(),
            }
        })?;
        let mut user = UserInfo::from_claims(&access_claims, &self.roles_path, &self.groups_path)
            .inspect_err(|e| warn!(error = %e, "Unable to get roles/groups from the access token"))?;
        if user.subject.is_none() {
            user.subject = id_claims.get("sub").and_then(Value::as_str).map(str::to_string);
        }

        session.set_user_info(user.clone());
        info!(
            email = ?user.email,
            subject = ?user.subject,
            roles = ?user.roles,
            "OpenID Connect login completed"
        );
        Ok(user)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let client_id: String = url::form_urlencoded::byte_serialize(self.client_id.as_bytes()).collect();
        let client_secret: String =
            url::form_urlencoded::byte_serialize(self.client_secret.as_bytes()).collect();

        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, token_endpoint = %self.token_endpoint, "Token endpoint unreachable");
                AuthError::CodeExchange
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                body = %body.chars().take(512).collect::<String>(),
                "Failed to exchange the authorization code"
            );
            return Err(AuthError::CodeExchange);
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            warn!(error = %e, "Invalid token endpoint response");
            AuthError::CodeExchange
        })
    }
}
