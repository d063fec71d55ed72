// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Small security primitives shared by the authentication strategies.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AuthError;

/// Number of random bytes in an OIDC `state` / `nonce` value.
const RANDOM_TOKEN_BYTES: usize = 16;

/// Compare two secrets without leaking length or content through timing.
///
/// Both inputs are hashed first so the comparison always runs over 32 bytes.
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let left = Sha256::digest(left);
    let right = Sha256::digest(right);
    left.ct_eq(&right).into()
}

/// Generate a URL-safe random token (16 bytes of entropy).
pub fn random_token(rng: &SystemRandom) -> Result<String, AuthError> {
    let mut bytes = [0u8; RANDOM_TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| AuthError::Internal("system random source failed".to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
