// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-lived signed check-in tokens.
//!
//! A check-in token is an HS256 JWT carrying only `iat` and `exp`. It
//! authorizes one attendance attempt and carries no identity; identity is
//! established later by the provider handoff. Tokens expire a fixed
//! duration after issuance (the QR code on the entry page is re-rendered
//! with a fresh token on every fetch, so the reuse window stays small).
//!
//! Validation fails closed: anything that does not verify as a token this
//! service signed is `Invalid`; only a well-signed token whose window has
//! passed is `Expired`. The two outcomes are surfaced differently to the
//! user. There is no per-token revocation; rotating the signing secret
//! invalidates everything outstanding.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::error::CheckInError;

/// Claims carried by a check-in token. Exactly one validity window,
/// nothing else.
#[derive(Debug, Serialize, Deserialize)]
struct CheckInClaims {
    iat: i64,
    exp: i64,
}

/// Outcome of validating a presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    Valid,
    Expired,
    Invalid,
}

impl TokenOutcome {
    /// Lift a validation outcome into the request error taxonomy.
    pub fn into_result(self) -> Result<(), CheckInError> {
        match self {
            TokenOutcome::Valid => Ok(()),
            TokenOutcome::Expired => Err(CheckInError::TokenExpired),
            TokenOutcome::Invalid => Err(CheckInError::TokenInvalid),
        }
    }
}

/// Stateless issuer/validator for check-in tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Seconds a freshly issued token stays valid.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a token valid from now until now + ttl.
    pub fn issue(&self) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(Utc::now())
    }

    /// Issue a token anchored at an explicit instant.
    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = CheckInClaims {
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Verify signature and validity window.
    pub fn validate(&self, token: &str) -> TokenOutcome {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // A token is expired the second its window closes.
        validation.leeway = 0;

        match decode::<CheckInClaims>(token, &self.decoding_key, &validation) {
            Ok(_) => TokenOutcome::Valid,
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => TokenOutcome::Expired,
                _ => TokenOutcome::Invalid,
            },
        }
    }
}
