// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Module
//!
//! casbin RBAC evaluation of `(role:<name>, path, method)` for every
//! authenticated request.

pub mod enforcer;
pub mod middleware;

pub use enforcer::{Decision, PolicyEnforcer, ROLE_PREFIX};
