// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authgate - Authentication / Authorization Gateway
//!
//! Every protected request goes through the same pipeline: an ordered chain
//! of authentication strategies establishes the caller's identity, then a
//! casbin RBAC policy decides whether the caller's roles may perform the
//! request. Business handlers only ever see authorized requests.
//!
//! ## Modules
//!
//! - `auth` - Basic, Bearer (JWT/JWKS) and OpenID Connect strategies
//! - `authz` - casbin policy engine and authorization middleware
//! - `api` - HTTP routes (health checks, login, profile, OpenAPI docs)
//! - `config` - YAML configuration
//! - `http_security` - CORS and security response headers

pub mod api;
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod http_security;
pub mod logging;
pub mod state;
