//! Gateway error model.
//!
//! Every failure that reaches the dispatcher is a [`GatewayError`]. The
//! [`ErrorKind`] decides the transport status; the message is what gets logged
//! and the optional source keeps the causal chain for server-side logs only.

use core::fmt;

use thiserror::Error;

/// Result type used across the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a caller could not be authenticated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AuthFailure {
    /// Missing `Authorization` header or unknown scheme.
    InvalidHeader,
    /// Token could not be decoded / claim is malformed.
    InvalidFormat,
    /// Signature did not verify.
    BadSignature,
    /// Claim is past its expiry.
    Expired,
    /// Token was revoked before its natural expiry.
    Revoked,
    /// Verification key could not be resolved.
    KeyUnavailable,
    /// User id / password pair rejected at login.
    InvalidCredentials,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::InvalidHeader => "invalid_header",
            AuthFailure::InvalidFormat => "invalid_format",
            AuthFailure::BadSignature => "bad_signature",
            AuthFailure::Expired => "expired",
            AuthFailure::Revoked => "revoked",
            AuthFailure::KeyUnavailable => "key_unavailable",
            AuthFailure::InvalidCredentials => "invalid_credentials",
        }
    }

    /// Expected, benign rejections (logged at info rather than error).
    pub fn is_benign(&self) -> bool {
        matches!(self, AuthFailure::Expired | AuthFailure::Revoked)
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed caller input (e.g. blank user id).
    InvalidInput,
    Unauthenticated(AuthFailure),
    /// Authorization denial.
    Forbidden,
    /// An authorization gate ran without a prior authentication gate.
    MissingPrincipal,
    /// The resource already exists.
    Conflict,
    NotFound,
    MethodNotAllowed,
    /// Directory / key-store failure.
    UpstreamFailure,
    /// The request did not complete within its deadline.
    Timeout,
    InternalFailure,
}

impl ErrorKind {
    /// Stable machine-readable code, safe to expose to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            // Unauthenticated sub-classes are deliberately not exposed.
            ErrorKind::Unauthenticated(_) => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::MissingPrincipal => "internal_error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::MethodNotAllowed => "method_not_allowed",
            ErrorKind::UpstreamFailure => "upstream_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InternalFailure => "internal_error",
        }
    }

    /// Generic, non-leaking message for the response body.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid request",
            ErrorKind::Unauthenticated(_) => "verification error",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "resource already exists",
            ErrorKind::NotFound => "not found",
            ErrorKind::MethodNotAllowed => "method not allowed",
            ErrorKind::UpstreamFailure => "upstream service error",
            ErrorKind::Timeout => "request timed out",
            ErrorKind::MissingPrincipal | ErrorKind::InternalFailure => "server error",
        }
    }

    /// True when the failure is the server's fault rather than the caller's.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingPrincipal
                | ErrorKind::UpstreamFailure
                | ErrorKind::Timeout
                | ErrorKind::InternalFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unauthenticated(failure) => write!(f, "unauthenticated({failure})"),
            other => f.write_str(other.code()),
        }
    }
}

/// Classified gateway error with an opaque cause chain.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause (kept for logs, never sent to clients).
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg)
    }

    pub fn unauthenticated(failure: AuthFailure, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated(failure), msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }

    pub fn missing_principal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingPrincipal, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamFailure, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalFailure, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The authentication sub-class, if this is an authentication failure.
    pub fn auth_failure(&self) -> Option<AuthFailure> {
        match self.kind {
            ErrorKind::Unauthenticated(failure) => Some(failure),
            _ => None,
        }
    }

    /// Render the message followed by every cause in the chain.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut cur = std::error::Error::source(self);
        while let Some(cause) = cur {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            cur = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct Root;

    #[test]
    fn unauthenticated_subclass_is_hidden_from_code() {
        let expired = GatewayError::unauthenticated(AuthFailure::Expired, "claim expired");
        let revoked = GatewayError::unauthenticated(AuthFailure::Revoked, "claim revoked");

        assert_eq!(expired.kind().code(), revoked.kind().code());
        assert_eq!(expired.kind().public_message(), "verification error");
        assert_eq!(expired.auth_failure(), Some(AuthFailure::Expired));
        assert_ne!(expired.kind(), revoked.kind());
    }

    #[test]
    fn chain_includes_sources() {
        let err = GatewayError::upstream("directory lookup failed").with_source(Root);
        let chain = err.chain();

        assert!(chain.starts_with("upstream_failure: directory lookup failed"));
        assert!(chain.ends_with("disk on fire"));
    }

    #[test]
    fn server_errors_are_classified() {
        assert!(ErrorKind::MissingPrincipal.is_server_error());
        assert!(ErrorKind::InternalFailure.is_server_error());
        assert!(!ErrorKind::Forbidden.is_server_error());
        assert!(!ErrorKind::Unauthenticated(AuthFailure::BadSignature).is_server_error());
    }

    #[test]
    fn only_expired_and_revoked_are_benign() {
        assert!(AuthFailure::Expired.is_benign());
        assert!(AuthFailure::Revoked.is_benign());
        assert!(!AuthFailure::BadSignature.is_benign());
        assert!(!AuthFailure::InvalidHeader.is_benign());
    }
}
