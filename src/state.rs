// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthenticatorChain;
use crate::authz::PolicyEnforcer;
use crate::config::{ConfigError, SecurityConfig};

/// Shared, immutable-after-startup pipeline components.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: AuthenticatorChain,
    pub enforcer: Arc<PolicyEnforcer>,
}

impl AppState {
    pub fn new(authenticator: AuthenticatorChain, enforcer: PolicyEnforcer) -> Self {
        Self {
            authenticator,
            enforcer: Arc::new(enforcer),
        }
    }

    /// Build every strategy and the policy engine. Any failure is fatal.
    pub async fn from_config(config: &SecurityConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.authn.http_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let authenticator = AuthenticatorChain::build(&config.authn, http).await?;
        let enforcer = PolicyEnforcer::from_config(&config.authz).await?;
        Ok(Self::new(authenticator, enforcer))
    }
}
