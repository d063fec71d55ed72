// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! The gateway reads a YAML file at startup (see [`AppConfig`]). A handful of
//! environment variables select the file and override process-level settings.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTHGATE_CONFIG` | Path to the YAML configuration file | `config.yaml` |
//! | `HOST` | Server bind address (overrides `server.listenAddress`) | `0.0.0.0` |
//! | `PORT` | Server bind port (overrides `server.port`) | `8090` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Every error raised while loading or validating configuration is a
//! [`ConfigError`]; the process refuses to start on any of them.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable name for the configuration file path.
pub const CONFIG_PATH_ENV: &str = "AUTHGATE_CONFIG";

/// Configuration file used when `AUTHGATE_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Environment variable overriding `server.listenAddress`.
pub const HOST_ENV: &str = "HOST";

/// Environment variable overriding `server.port`.
pub const PORT_ENV: &str = "PORT";

/// Environment variable selecting the log format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Log filter used when neither `RUST_LOG` nor `logging.level` is set.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Prefix of every protected API route.
pub const API_BASE_PATH: &str = "/api/v1";

/// Swagger UI location (public).
pub const API_DOCS_PATH: &str = "/api/v1/api-docs";

/// Liveness check (public).
pub const HEALTHZ_PATH: &str = "/healthz";

/// Readiness check (public).
pub const READINESS_PATH: &str = "/readiness";

/// Default OpenID Connect login entry point.
pub const DEFAULT_LOGIN_PATH: &str = "/oauth_login";

/// Default name of the encrypted OpenID Connect session cookie.
pub const DEFAULT_SESSION_COOKIE: &str = "AUTHGATE_OIDC_SESSION";

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8090;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_JWKS_REFRESH_SECS: u64 = 300;
const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 86_400;
const DEFAULT_SCOPE: &str = "openid+email+profile";

/// Startup configuration failure. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown authentication provider: {0}")]
    UnknownProvider(String),

    #[error("provider '{0}' is enabled but has no configuration section")]
    MissingProviderConfig(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("OpenID Connect discovery failed for issuer {issuer}: {reason}")]
    Discovery { issuer: String, reason: String },

    #[error("failed to load authorization policy: {0}")]
    Policy(String),

    #[error("authorization provider '{0}' is not implemented")]
    NotImplemented(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Root of the YAML configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// Load the file named by `AUTHGATE_CONFIG` and apply environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.security.authn.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var(HOST_ENV) {
            self.server.listen_address = host;
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                field: "PORT",
                reason: format!("'{port}' is not a valid port number"),
            })?;
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            port: default_port(),
        }
    }
}

/// Logging settings; `RUST_LOG` / `LOG_FORMAT` take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Security section: authentication, authorization and HTTP hardening.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(rename = "authN")]
    pub authn: AuthnConfig,
    #[serde(rename = "authZ")]
    pub authz: AuthzConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Authentication providers, in the order they run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthnConfig {
    /// Ordered provider names: `basic`, `bearer`, `openid`.
    #[serde(default)]
    pub provider: Vec<String>,
    #[serde(default)]
    pub basic: Vec<BasicCredential>,
    #[serde(default)]
    pub bearer: Option<BearerConfig>,
    #[serde(default)]
    pub openid: Option<OpenIdConfig>,
    /// Upper bound for every call to the identity provider.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Background refresh interval of the JWKS caches.
    #[serde(default = "default_jwks_refresh_secs")]
    pub jwks_refresh_secs: u64,
}

impl AuthnConfig {
    /// Reject durations that would disable the timeout or spin the refresher.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "security.authN.httpTimeoutSecs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.jwks_refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "security.authN.jwksRefreshSecs",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn jwks_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_secs)
    }
}

/// One entry of the static Basic credential table.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicCredential {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl fmt::Debug for BasicCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredential")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Stateless JWT verification settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BearerConfig {
    pub issuer_uri: String,
    #[serde(rename = "jwksURL")]
    pub jwks_url: String,
    #[serde(default)]
    pub roles_attribute_path: String,
    #[serde(default)]
    pub groups_attribute_path: String,
    #[serde(default)]
    pub skip_issuer_check: bool,
    /// Test/dev only. Removes the signature guarantee entirely.
    #[serde(default)]
    pub skip_signature_check: bool,
    /// Expected `aud` claim; not validated when absent.
    #[serde(default)]
    pub audience: Option<String>,
}

/// OpenID Connect Authorization-Code flow settings.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenIdConfig {
    pub client_id: String,
    pub client_secret: String,
    pub issuer_uri: String,
    pub redirect_uri: String,
    pub cookie_secret: String,
    /// `+`-separated scopes, e.g. `openid+email+profile`.
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub roles_attribute_path: String,
    #[serde(default)]
    pub groups_attribute_path: String,
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: u64,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl OpenIdConfig {
    /// Scopes requested from the identity provider.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }
}

impl fmt::Debug for OpenIdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenIdConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("issuer_uri", &self.issuer_uri)
            .field("redirect_uri", &self.redirect_uri)
            .field("cookie_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("roles_attribute_path", &self.roles_attribute_path)
            .field("groups_attribute_path", &self.groups_attribute_path)
            .field("cookie_name", &self.cookie_name)
            .field("session_max_age_secs", &self.session_max_age_secs)
            .field("login_path", &self.login_path)
            .finish()
    }
}

/// Where the RBAC policy comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthzProvider {
    File,
    Inline,
    Database,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthzConfig {
    pub provider: AuthzProvider,
    #[serde(default)]
    pub file: Option<FileAuthz>,
    #[serde(default)]
    pub inline: Option<InlineAuthz>,
    #[serde(default)]
    pub database: Option<DatabaseAuthz>,
}

/// casbin model + policy files.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAuthz {
    pub model_path: PathBuf,
    pub policy_path: PathBuf,
}

/// casbin model + policy embedded in the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineAuthz {
    pub model: String,
    pub policy: String,
}

/// Declared for configuration compatibility; rejected at startup.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAuthz {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

impl fmt::Debug for DatabaseAuthz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseAuthz")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

/// Cross-origin settings. An empty origin list disables CORS handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub exposed_headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds.
    #[serde(default)]
    pub max_age: u64,
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_jwks_refresh_secs() -> u64 {
    DEFAULT_JWKS_REFRESH_SECS
}

fn default_session_max_age_secs() -> u64 {
    DEFAULT_SESSION_MAX_AGE_SECS
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}
