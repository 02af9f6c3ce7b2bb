//! Claim issuance and verification (Ed25519-signed JWTs).
//!
//! Verification walks `Unparsed → NotRevoked → Parsed/SignatureValid →
//! NotExpired → Accepted`; every step has its own [`TokenError`] so callers can
//! tell a revoked token from a forged or malformed one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use gatehouse_core::{AuthFailure, GatewayError};

use crate::claims::{TokenValidationError, validate_claims};
use crate::{Claim, KeyError, KeySource, RevocationLedger};

const SIGNING_ALGORITHM: Algorithm = Algorithm::EdDSA;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("bad token signature: {0}")]
    BadSignature(String),

    #[error("claim is expired")]
    Expired,

    #[error("claim is revoked")]
    Revoked,

    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("key cannot be parsed: {0}")]
    KeyFormat(String),

    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    #[error("failed to sign claim: {0}")]
    Signing(String),
}

impl TokenError {
    /// Authentication sub-class for verification failures; `None` for
    /// issuer-side failures.
    pub fn auth_failure(&self) -> Option<AuthFailure> {
        match self {
            TokenError::InvalidFormat(_) | TokenError::InvalidClaim(_) => {
                Some(AuthFailure::InvalidFormat)
            }
            TokenError::BadSignature(_) => Some(AuthFailure::BadSignature),
            TokenError::Expired => Some(AuthFailure::Expired),
            TokenError::Revoked => Some(AuthFailure::Revoked),
            TokenError::KeyUnavailable(_) | TokenError::KeyFormat(_) => {
                Some(AuthFailure::KeyUnavailable)
            }
            TokenError::Signing(_) => None,
        }
    }
}

impl From<KeyError> for TokenError {
    fn from(err: KeyError) -> Self {
        TokenError::KeyUnavailable(err.to_string())
    }
}

impl From<TokenValidationError> for TokenError {
    fn from(err: TokenValidationError) -> Self {
        match err {
            TokenValidationError::Expired => TokenError::Expired,
            TokenValidationError::InvalidTimeWindow => TokenError::InvalidClaim(err.to_string()),
        }
    }
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err.auth_failure() {
            Some(failure) => GatewayError::unauthenticated(failure, "token verification failed")
                .with_source(err),
            None => GatewayError::internal("token issuance failed").with_source(err),
        }
    }
}

fn classify_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => TokenError::BadSignature(err.to_string()),
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) => {
            TokenError::KeyFormat(err.to_string())
        }
        _ => TokenError::InvalidFormat(err.to_string()),
    }
}

/// A signed token together with the claim it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claim: Claim,
}

/// Signs claims. Needs the private key only.
pub struct ClaimIssuer {
    keys: Arc<dyn KeySource>,
}

impl ClaimIssuer {
    pub fn new(keys: Arc<dyn KeySource>) -> Self {
        Self { keys }
    }

    /// Stamp the validity window (`now` .. `now + TOKEN_LIFETIME`) and sign.
    pub async fn issue(&self, mut claim: Claim, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let pem = self.keys.signing_key().await?;
        let key = EncodingKey::from_ed_pem(pem.as_bytes())
            .map_err(|e| TokenError::KeyFormat(e.to_string()))?;

        claim.stamp(now);
        let token = jsonwebtoken::encode(&Header::new(SIGNING_ALGORITHM), &claim, &key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        tracing::debug!(
            user_id = %claim.user.user_id,
            expires_at = %claim.expires_at_utc(),
            "claim issued"
        );
        Ok(IssuedToken { token, claim })
    }
}

/// Verifies and revokes tokens. Needs the public key and the revocation ledger.
pub struct ClaimVerifier {
    keys: Arc<dyn KeySource>,
    ledger: Arc<RevocationLedger>,
    validation: Validation,
}

impl ClaimVerifier {
    pub fn new(keys: Arc<dyn KeySource>, ledger: Arc<RevocationLedger>) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is enforced by `validate_claims` (nanosecond timestamps), and
        // audience checks are left to the caller.
        validation.validate_exp = false;
        validation.validate_aud = false;

        Self {
            keys,
            ledger,
            validation,
        }
    }

    pub fn ledger(&self) -> &Arc<RevocationLedger> {
        &self.ledger
    }

    pub async fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claim, TokenError> {
        if token.is_empty() {
            return Err(TokenError::InvalidFormat("empty token".to_string()));
        }
        // Revocation is checked before any parsing.
        if self.ledger.is_blocked(token, now) {
            return Err(TokenError::Revoked);
        }

        let claim = self.decode(token).await?;
        validate_claims(&claim, now)?;
        Ok(claim)
    }

    /// Revoke `token` until its natural expiry. An empty token is a no-op.
    pub async fn block(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        if token.is_empty() {
            return Ok(());
        }

        let claim = self.decode(token).await?;
        if self.ledger.block(token, &claim, now) {
            tracing::info!(user_id = %claim.user.user_id, "token revoked");
        } else {
            tracing::debug!(user_id = %claim.user.user_id, "token already expired; not recorded");
        }
        Ok(())
    }

    /// Resolve the key, check the signature and deserialize the claim.
    async fn decode(&self, token: &str) -> Result<Claim, TokenError> {
        let pem = self.keys.verification_key().await?;
        let key = DecodingKey::from_ed_pem(pem.as_bytes())
            .map_err(|e| TokenError::KeyFormat(e.to_string()))?;

        let data = jsonwebtoken::decode::<Claim>(token, &key, &self.validation)
            .map_err(classify_decode_error)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration;

    use super::*;
    use crate::keys::dev_keys;
    use crate::{PermissionBit, StaticKeySource, TOKEN_LIFETIME, UserContext, generate_bit};
    use gatehouse_core::UserId;

    const OTHER_VERIFICATION_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MCowBQYDK2VwAyEA/XVpPtQvHN+AvLFQEkNQVhcb8R3EXgtVlqPCHQbH6cQ=
-----END PUBLIC KEY-----
";

    fn services() -> (ClaimIssuer, ClaimVerifier) {
        let keys: Arc<dyn KeySource> = Arc::new(StaticKeySource::development());
        let ledger = Arc::new(RevocationLedger::new());
        (
            ClaimIssuer::new(keys.clone()),
            ClaimVerifier::new(keys, ledger),
        )
    }

    fn alice_claim() -> Claim {
        let bit = generate_bit([0, 1]).unwrap();
        Claim::new(
            UserContext::new(UserId::parse("alice").unwrap(), bit)
                .with_display_name("Alice")
                .with_locale("en", "UTC"),
        )
        .with_issuer("gatehouse")
        .with_audience("gatehouse-api")
    }

    #[tokio::test]
    async fn issue_then_verify_roundtrip() {
        let (issuer, verifier) = services();
        let now = Utc::now();

        let issued = issuer.issue(alice_claim(), now).await.unwrap();
        let claim = verifier.verify(&issued.token, now).await.unwrap();

        assert_eq!(claim.user, alice_claim().user);
        assert_eq!(claim.issuer, "gatehouse");
        assert_eq!(claim.subject, "alice");
        assert_eq!(
            claim.expires_at - claim.issued_at,
            TOKEN_LIFETIME.num_nanoseconds().unwrap()
        );
    }

    mod roundtrip {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: whatever identity goes in comes back out of verify.
            #[test]
            fn verify_returns_the_issued_user(
                user_id in "[a-z][a-z0-9_]{0,15}",
                display_name in "\\PC{0,24}",
                locale in "[a-z]{2}(-[A-Z]{2})?",
                zone in "[A-Za-z_/+-]{0,20}",
                bits in any::<u64>(),
            ) {
                let user = UserContext::new(UserId::parse(&user_id).unwrap(), PermissionBit::from_bits(bits))
                    .with_display_name(display_name)
                    .with_locale(locale, zone);

                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let (claim, verified) = runtime.block_on(async {
                    let (issuer, verifier) = services();
                    let now = Utc::now();
                    let issued = issuer.issue(Claim::new(user.clone()), now).await.unwrap();
                    let verified = verifier.verify(&issued.token, now).await;
                    (issued.claim, verified)
                });

                prop_assert_eq!(verified, Ok(claim.clone()));
                prop_assert_eq!(claim.user, user);
            }
        }
    }

    #[tokio::test]
    async fn expired_even_with_valid_signature() {
        let (issuer, verifier) = services();
        let now = Utc::now();
        let issued = issuer.issue(alice_claim(), now).await.unwrap();

        let err = verifier
            .verify(&issued.token, now + TOKEN_LIFETIME)
            .await
            .unwrap_err();
        assert_eq!(err, TokenError::Expired);
        assert!(
            verifier
                .verify(&issued.token, now + TOKEN_LIFETIME - Duration::seconds(1))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn revoked_until_natural_expiry() {
        let (issuer, verifier) = services();
        let now = Utc::now();
        let issued = issuer.issue(alice_claim(), now).await.unwrap();

        verifier.block(&issued.token, now).await.unwrap();

        let mid = now + Duration::minutes(10);
        assert_eq!(verifier.verify(&issued.token, mid).await, Err(TokenError::Revoked));

        // Past expiry the entry is dead; the token fails as expired instead.
        let after = now + TOKEN_LIFETIME + Duration::seconds(1);
        assert_eq!(verifier.verify(&issued.token, after).await, Err(TokenError::Expired));
    }

    #[tokio::test]
    async fn empty_and_garbage_tokens_are_invalid_format() {
        let (_, verifier) = services();
        let now = Utc::now();

        assert!(matches!(
            verifier.verify("", now).await,
            Err(TokenError::InvalidFormat(_))
        ));
        let err = verifier.verify("not-a-token", now).await.unwrap_err();
        assert_eq!(err.auth_failure(), Some(AuthFailure::InvalidFormat));
    }

    #[tokio::test]
    async fn foreign_key_is_bad_signature() {
        let (issuer, _) = services();
        let now = Utc::now();
        let issued = issuer.issue(alice_claim(), now).await.unwrap();

        let other = ClaimVerifier::new(
            Arc::new(StaticKeySource::verification_only(OTHER_VERIFICATION_KEY_PEM)),
            Arc::new(RevocationLedger::new()),
        );
        assert!(matches!(
            other.verify(&issued.token, now).await,
            Err(TokenError::BadSignature(_))
        ));
    }

    #[tokio::test]
    async fn symmetric_algorithm_is_rejected() {
        let (_, verifier) = services();
        let mut claim = alice_claim();
        claim.user.permission_bit = PermissionBit::ROOT;
        claim.stamp(Utc::now());

        let forged = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claim,
            &EncodingKey::from_secret(dev_keys::VERIFICATION_KEY_PEM.as_bytes()),
        )
        .unwrap();

        let err = verifier.verify(&forged, Utc::now()).await.unwrap_err();
        assert_eq!(err.auth_failure(), Some(AuthFailure::BadSignature));
    }

    #[tokio::test]
    async fn missing_keys_are_key_unavailable() {
        let empty: Arc<dyn KeySource> = Arc::new(StaticKeySource::default());
        let issuer = ClaimIssuer::new(empty.clone());
        let verifier = ClaimVerifier::new(empty, Arc::new(RevocationLedger::new()));

        assert!(matches!(
            issuer.issue(alice_claim(), Utc::now()).await,
            Err(TokenError::KeyUnavailable(_))
        ));
        assert!(matches!(
            verifier.verify("a.b.c", Utc::now()).await,
            Err(TokenError::KeyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unparsable_signing_key_is_key_format() {
        let issuer = ClaimIssuer::new(Arc::new(StaticKeySource::new(
            "not a pem",
            dev_keys::VERIFICATION_KEY_PEM,
        )));
        assert!(matches!(
            issuer.issue(alice_claim(), Utc::now()).await,
            Err(TokenError::KeyFormat(_))
        ));
    }

    #[tokio::test]
    async fn block_empty_is_noop_and_garbage_is_error() {
        let (_, verifier) = services();
        let now = Utc::now();

        assert!(verifier.block("", now).await.is_ok());
        assert!(verifier.block("garbage", now).await.is_err());
        assert!(verifier.ledger().is_empty());
    }

    #[tokio::test]
    async fn revoked_is_distinguishable_from_gateway_error() {
        let (issuer, verifier) = services();
        let now = Utc::now();
        let issued = issuer.issue(alice_claim(), now).await.unwrap();
        verifier.block(&issued.token, now).await.unwrap();

        let err: GatewayError = verifier.verify(&issued.token, now).await.unwrap_err().into();
        assert_eq!(err.auth_failure(), Some(AuthFailure::Revoked));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn block_is_visible_to_every_later_verify() {
        let (issuer, verifier) = services();
        let verifier = Arc::new(verifier);
        let now = Utc::now();
        let token = Arc::new(issuer.issue(alice_claim(), now).await.unwrap().token);
        let blocked = Arc::new(AtomicBool::new(false));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let verifier = verifier.clone();
                let token = token.clone();
                let blocked = blocked.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let done = blocked.load(Ordering::SeqCst);
                        let res = verifier.verify(&token, now).await;
                        if done {
                            assert_eq!(res, Err(TokenError::Revoked));
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        verifier.block(&token, now).await.unwrap();
        blocked.store(true, Ordering::SeqCst);

        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(verifier.verify(&token, now).await, Err(TokenError::Revoked));
    }
}
