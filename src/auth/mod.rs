// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Pluggable authentication strategies composed into one middleware chain.
//!
//! ## Strategies
//!
//! - `basic`: static credential table, `Authorization: Basic`
//! - `bearer`: stateless JWT verification against an issuer's JWKS
//! - `openid`: OpenID Connect Authorization-Code flow with an encrypted
//!   session cookie
//!
//! ## Auth Flow
//!
//! 1. [`middleware::authenticate`] runs the configured strategies in order
//! 2. The winning strategy yields a [`UserInfo`] (roles/groups resolved from
//!    configured attribute paths)
//! 3. The principal is stored as a [`SecurityContext`] in the request
//!    extensions, for the authorization step and for handlers
//!
//! ## Security
//!
//! - Signature, expiry and issuer are validated unless explicitly disabled
//! - Passwords, `state` and `nonce` are compared in constant time
//! - JWKS is cached, refreshed in the background, served stale on error
//! - Clock skew tolerance is 60 seconds

pub mod basic;
pub mod bearer;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod oidc;
pub mod security;
pub mod session;
pub mod verifier;

pub use claims::UserInfo;
pub use error::{AuthError, TokenError};
pub use extractor::{Auth, SecurityContext};
pub use jwks::JwksManager;
pub use middleware::{AuthOutcome, AuthProvider, AuthenticatorChain};
