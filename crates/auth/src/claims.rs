use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::unix_nanos;

use crate::UserContext;

/// Fixed validity window of an issued claim.
pub const TOKEN_LIFETIME: Duration = Duration::minutes(30);

/// Signed identity assertion carried by a bearer token.
///
/// Timestamps are unix nanoseconds. Only the issuer stamps `issued_at` /
/// `expires_at`; a freshly built claim has both at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "userContext")]
    pub user: UserContext,

    #[serde(rename = "iss", default)]
    pub issuer: String,

    #[serde(rename = "aud", default)]
    pub audience: String,

    #[serde(rename = "sub", default)]
    pub subject: String,

    #[serde(rename = "iat")]
    pub issued_at: i64,

    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl Claim {
    pub fn new(user: UserContext) -> Self {
        let subject = user.user_id.to_string();
        Self {
            user,
            issuer: String::new(),
            audience: String::new(),
            subject,
            issued_at: 0,
            expires_at: 0,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Stamp the validity window starting at `now`.
    pub(crate) fn stamp(&mut self, now: DateTime<Utc>) {
        self.issued_at = unix_nanos(now);
        self.expires_at = unix_nanos(now + TOKEN_LIFETIME);
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= unix_nanos(now)
    }

    /// Expiry as a UTC timestamp.
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.expires_at)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("claim has expired")]
    Expired,

    #[error("invalid claim time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim's validity window.
///
/// Signature verification happens before this in [`crate::ClaimVerifier`];
/// this only looks at the timestamps.
pub fn validate_claims(claim: &Claim, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claim.expires_at <= claim.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if claim.is_expired_at(now) {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
