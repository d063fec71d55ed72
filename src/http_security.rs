// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Browser-facing HTTP hardening: CORS policy and static response headers.
//!
//! Both come from the `security` section of the configuration and apply to
//! every route, public or protected.
//!
//! - An empty `allowedOrigins` list disables CORS handling altogether.
//! - `"*"` in a list means "any"; it cannot be combined with
//!   `allowCredentials` (browsers reject that pairing).
//! - Configured headers are only set when the handler did not set them.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer, ExposeHeaders};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{ConfigError, CorsConfig, SecurityConfig};

/// Apply the configured CORS policy and security headers to `router`.
pub fn apply(router: Router, config: &SecurityConfig) -> Result<Router, ConfigError> {
    let mut router = router;
    for (name, value) in security_headers(config)? {
        router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
    }
    if let Some(cors) = cors_layer(&config.cors)? {
        router = router.layer(cors);
    }
    Ok(router)
}

fn security_headers(config: &SecurityConfig) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigError> {
    config
        .headers
        .iter()
        .map(|(name, value)| {
            let header_name = HeaderName::try_from(name.as_str()).map_err(|e| ConfigError::Invalid {
                field: "security.headers",
                reason: format!("invalid header name '{name}': {e}"),
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
                field: "security.headers",
                reason: format!("invalid value for header '{name}': {e}"),
            })?;
            Ok((header_name, header_value))
        })
        .collect()
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v.trim() == "*")
}

/// Build the CORS layer, or `None` when no origin is allowed.
pub fn cors_layer(config: &CorsConfig) -> Result<Option<CorsLayer>, ConfigError> {
    if config.allowed_origins.is_empty() {
        return Ok(None);
    }

    let invalid = |reason: String| ConfigError::Invalid {
        field: "security.cors",
        reason,
    };

    if config.allow_credentials
        && (is_wildcard(&config.allowed_origins)
            || is_wildcard(&config.allowed_methods)
            || is_wildcard(&config.allowed_headers)
            || is_wildcard(&config.exposed_headers))
    {
        return Err(invalid("allowCredentials cannot be combined with '*'".to_string()));
    }

    let allow_origin = if is_wildcard(&config.allowed_origins) {
        AllowOrigin::from(Any)
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin.trim()).map_err(|e| invalid(format!("origin '{origin}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    let allow_methods = if config.allowed_methods.is_empty() {
        AllowMethods::list([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
    } else if is_wildcard(&config.allowed_methods) {
        AllowMethods::from(Any)
    } else {
        let methods = config
            .allowed_methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|e| invalid(format!("method '{method}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowMethods::list(methods)
    };

    let allow_headers = if is_wildcard(&config.allowed_headers) {
        AllowHeaders::from(Any)
    } else {
        AllowHeaders::list(header_names(&config.allowed_headers, &invalid)?)
    };

    let expose_headers = if is_wildcard(&config.exposed_headers) {
        ExposeHeaders::from(Any)
    } else {
        ExposeHeaders::list(header_names(&config.exposed_headers, &invalid)?)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(allow_methods)
        .allow_headers(allow_headers)
        .expose_headers(expose_headers)
        .allow_credentials(config.allow_credentials);
    if config.max_age > 0 {
        layer = layer.max_age(Duration::from_secs(config.max_age));
    }
    Ok(Some(layer))
}

fn header_names(
    values: &[String],
    invalid: &impl Fn(String) -> ConfigError,
) -> Result<Vec<HeaderName>, ConfigError> {
    values
        .iter()
        .map(|name| {
            HeaderName::try_from(name.trim()).map_err(|e| invalid(format!("header '{name}': {e}")))
        })
        .collect()
}
