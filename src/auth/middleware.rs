// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! [`AuthenticatorChain`] holds the configured strategies in order. The
//! [`authenticate`] middleware runs the chain, stores the resulting
//! [`SecurityContext`] in the request extensions and then applies the
//! terminal guard: a request without a security context never reaches the
//! next layer.
//!
//! ## Precedence
//!
//! Strategies run in configured order. The first one to answer decides the
//! request: success short-circuits the rest, a failure is terminal with the
//! strategy's own status, and a redirect (OpenID Connect login) aborts the
//! chain with a 307. With no strategies configured every request is rejected.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/api/v1/clusters", get(list_clusters))
//!     .route_layer(axum::middleware::from_fn_with_state(chain, authenticate));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info, warn};

use super::basic::BasicProvider;
use super::bearer::BearerProvider;
use super::extractor::SecurityContext;
use super::jwks::JwksManager;
use super::oidc::OidcProvider;
use super::{AuthError, UserInfo};
use crate::config::{AuthnConfig, ConfigError};

/// Result of running one strategy.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Identity established; `session_cookie` must be sent back when present.
    Authenticated {
        user: UserInfo,
        session_cookie: Option<HeaderValue>,
    },
    /// Abort the request with a temporary redirect.
    Redirect {
        location: String,
        session_cookie: HeaderValue,
    },
}

/// One configured authentication strategy.
pub enum AuthProvider {
    Basic(BasicProvider),
    Bearer(BearerProvider),
    OpenId(OidcProvider),
}

impl AuthProvider {
    /// Configuration name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            AuthProvider::Basic(_) => "basic",
            AuthProvider::Bearer(_) => "bearer",
            AuthProvider::OpenId(_) => "openid",
        }
    }

    pub async fn authenticate(&self, parts: &Parts) -> Result<AuthOutcome, AuthError> {
        match self {
            AuthProvider::Basic(basic) => basic.authenticate(&parts.headers).map(|user| {
                AuthOutcome::Authenticated {
                    user,
                    session_cookie: None,
                }
            }),
            AuthProvider::Bearer(bearer) => bearer.authenticate(&parts.headers).await.map(|user| {
                AuthOutcome::Authenticated {
                    user,
                    session_cookie: None,
                }
            }),
            AuthProvider::OpenId(oidc) => oidc.authenticate(parts).await,
        }
    }
}

/// Ordered, immutable list of strategies shared by every request.
#[derive(Clone)]
pub struct AuthenticatorChain {
    providers: Arc<Vec<AuthProvider>>,
}

impl AuthenticatorChain {
    /// Resolve each configured provider name to a strategy.
    ///
    /// Fails on an unknown name or a missing provider section. OpenID Connect
    /// discovery happens here, so an unreachable issuer also fails startup.
    pub async fn build(config: &AuthnConfig, http: reqwest::Client) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut providers = Vec::with_capacity(config.provider.len());

        for name in &config.provider {
            let provider = match name.as_str() {
                "basic" => {
                    if config.basic.is_empty() {
                        warn!("Basic authentication is enabled without any credentials");
                    }
                    AuthProvider::Basic(BasicProvider::new(&config.basic))
                }
                "bearer" => {
                    let bearer = config
                        .bearer
                        .as_ref()
                        .ok_or(ConfigError::MissingProviderConfig("bearer"))?;
                    AuthProvider::Bearer(BearerProvider::new(bearer, http.clone()))
                }
                "openid" => {
                    let openid = config
                        .openid
                        .as_ref()
                        .ok_or(ConfigError::MissingProviderConfig("openid"))?;
                    AuthProvider::OpenId(OidcProvider::discover(openid, http.clone()).await?)
                }
                other => return Err(ConfigError::UnknownProvider(other.to_string())),
            };
            providers.push(provider);
        }

        if providers.is_empty() {
            warn!("No authentication provider configured: every protected request will be rejected");
        }
        if providers.len() > 1 {
            warn!(
                active = providers[0].name(),
                unreachable = ?providers[1..].iter().map(AuthProvider::name).collect::<Vec<_>>(),
                "Only the first authentication provider decides each request; the others never run"
            );
        }
        info!(
            providers = ?providers.iter().map(AuthProvider::name).collect::<Vec<_>>(),
            "Authentication chain built"
        );
        Ok(Self::from_providers(providers))
    }

    pub fn from_providers(providers: Vec<AuthProvider>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn providers(&self) -> &[AuthProvider] {
        &self.providers
    }

    /// The OpenID Connect strategy, when it is the one deciding requests.
    pub fn openid(&self) -> Option<&OidcProvider> {
        match self.providers.first() {
            Some(AuthProvider::OpenId(oidc)) => Some(oidc),
            _ => None,
        }
    }

    /// Key-set caches of the deciding strategy, if it verifies tokens.
    pub fn key_sets(&self) -> Vec<JwksManager> {
        self.providers
            .first()
            .into_iter()
            .filter_map(|provider| match provider {
                AuthProvider::Bearer(bearer) => Some(bearer.jwks().clone()),
                AuthProvider::OpenId(oidc) => Some(oidc.jwks().clone()),
                AuthProvider::Basic(_) => None,
            })
            .collect()
    }

    /// Run the chain for one request.
    pub async fn authenticate(&self, parts: &Parts) -> Result<AuthOutcome, AuthError> {
        let Some(provider) = self.providers.first() else {
            return Err(AuthError::Unauthenticated);
        };

        match provider.authenticate(parts).await {
            Ok(outcome) => {
                if let AuthOutcome::Authenticated { user, .. } = &outcome {
                    debug!(provider = provider.name(), user = %user.display_id(), "Request authenticated");
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    provider = provider.name(),
                    path = %parts.uri.path(),
                    error_code = e.error_code(),
                    reason = %e,
                    "Authentication failed"
                );
                Err(e)
            }
        }
    }
}

/// Authentication middleware function.
pub async fn authenticate(
    State(chain): State<AuthenticatorChain>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let session_cookie = match chain.authenticate(&parts).await {
        Ok(AuthOutcome::Authenticated {
            user,
            session_cookie,
        }) => {
            parts.extensions.insert(SecurityContext::new(user));
            session_cookie
        }
        Ok(AuthOutcome::Redirect {
            location,
            session_cookie,
        }) => {
            let mut response = Redirect::temporary(&location).into_response();
            response.headers_mut().append(SET_COOKIE, session_cookie);
            return response;
        }
        Err(e) => return e.into_response(),
    };

    // Terminal guard.
    if parts.extensions.get::<SecurityContext>().is_none() {
        return AuthError::Unauthenticated.into_response();
    }

    let mut response = next.run(Request::from_parts(parts, body)).await;
    if let Some(cookie) = session_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}
