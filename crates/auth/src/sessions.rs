//! Login / registration: credentials in, signed claim out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use gatehouse_core::{AuthFailure, GatewayError, UserId};

use crate::{
    Claim, ClaimIssuer, DirectoryError, IssuedToken, PermissionBit, PermissionError,
    RoleDirectory, TokenError, UserContext, UserDirectory, UserRecord, generate_bit,
    generate_root_bit,
};

/// Values stamped into every issued claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub issuer: String,
    pub audience: String,
    /// The one account that receives the all-ones mask.
    pub root_user_id: UserId,
    pub default_locale: String,
    pub default_zone: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user `{0}` vanished between credential check and lookup")]
    UserMissing(UserId),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        let mapped = match &err {
            SessionError::InvalidCredentials => {
                GatewayError::unauthenticated(AuthFailure::InvalidCredentials, "invalid credentials")
            }
            SessionError::Directory(DirectoryError::InvalidUserInfo(_)) => {
                GatewayError::invalid_input("invalid user info")
            }
            SessionError::Directory(DirectoryError::InvalidPassword) => {
                GatewayError::invalid_input("invalid password")
            }
            SessionError::Directory(DirectoryError::AlreadyExists(_)) => {
                GatewayError::conflict("user already exists")
            }
            SessionError::Directory(DirectoryError::Unavailable(_)) => {
                GatewayError::upstream("user directory unavailable")
            }
            SessionError::Token(TokenError::KeyUnavailable(_)) => {
                GatewayError::upstream("signing key unavailable")
            }
            SessionError::UserMissing(_) | SessionError::Permission(_) | SessionError::Token(_) => {
                GatewayError::internal("session could not be created")
            }
        };
        mapped.with_source(err)
    }
}

/// Turns credentials into signed claims.
pub struct Authenticator {
    users: Arc<dyn UserDirectory>,
    roles: Arc<dyn RoleDirectory>,
    issuer: Arc<ClaimIssuer>,
    settings: SessionSettings,
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        roles: Arc<dyn RoleDirectory>,
        issuer: Arc<ClaimIssuer>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            users,
            roles,
            issuer,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn login(
        &self,
        user_id: &UserId,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, SessionError> {
        if !self.users.verify_password(user_id, password).await? {
            tracing::info!(user_id = %user_id, "login rejected");
            return Err(SessionError::InvalidCredentials);
        }

        let record = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| SessionError::UserMissing(user_id.clone()))?;

        let issued = self.issue_for(record, now).await?;
        tracing::info!(user_id = %user_id, "login succeeded");
        Ok(issued)
    }

    pub async fn register(
        &self,
        record: UserRecord,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, SessionError> {
        self.users.register_user(record.clone(), password).await?;
        tracing::info!(user_id = %record.user_id, "user registered");
        self.issue_for(record, now).await
    }

    /// Map the user's grants to a mask. The configured root user gets the
    /// all-ones sentinel regardless of grants.
    pub async fn permission_bit_for(&self, user_id: &UserId) -> Result<PermissionBit, SessionError> {
        let indices = self.roles.list_granted_indices(user_id).await?;
        if *user_id == self.settings.root_user_id {
            return Ok(generate_root_bit());
        }
        Ok(generate_bit(indices)?)
    }

    async fn issue_for(
        &self,
        record: UserRecord,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, SessionError> {
        let bit = self.permission_bit_for(&record.user_id).await?;

        let locale = record
            .locale
            .unwrap_or_else(|| self.settings.default_locale.clone());
        let zone = record
            .zone_id
            .unwrap_or_else(|| self.settings.default_zone.clone());
        let user = UserContext::new(record.user_id, bit)
            .with_display_name(record.display_name)
            .with_locale(locale, zone);

        let claim = Claim::new(user)
            .with_issuer(self.settings.issuer.clone())
            .with_audience(self.settings.audience.clone());
        Ok(self.issuer.issue(claim, now).await?)
    }
}

#[cfg(test)]
mod tests {
    use gatehouse_core::ErrorKind;

    use super::*;
    use crate::{
        ClaimVerifier, InMemoryRoleDirectory, InMemoryUserDirectory, KeySource, RevocationLedger,
        StaticKeySource, TOKEN_LIFETIME,
    };

    struct Fixture {
        auth: Authenticator,
        roles: Arc<InMemoryRoleDirectory>,
        verifier: ClaimVerifier,
    }

    fn uid(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn fixture() -> Fixture {
        let keys: Arc<dyn KeySource> = Arc::new(StaticKeySource::development());
        let roles = Arc::new(InMemoryRoleDirectory::with_demo_grants());
        let auth = Authenticator::new(
            Arc::new(InMemoryUserDirectory::with_demo_users().unwrap()),
            roles.clone(),
            Arc::new(ClaimIssuer::new(keys.clone())),
            SessionSettings {
                issuer: "gatehouse".to_string(),
                audience: "gatehouse-api".to_string(),
                root_user_id: uid("root"),
                default_locale: "en".to_string(),
                default_zone: "UTC".to_string(),
            },
        );
        Fixture {
            auth,
            roles,
            verifier: ClaimVerifier::new(keys, Arc::new(RevocationLedger::new())),
        }
    }

    #[tokio::test]
    async fn registered_user_gets_granted_bits() {
        let f = fixture();
        let now = Utc::now();
        f.roles.grant(&uid("alice"), &[0, 1]);

        let issued = f
            .auth
            .register(UserRecord::new(uid("alice"), "Alice"), "wonderland", now)
            .await
            .unwrap();
        let claim = f.verifier.verify(&issued.token, now).await.unwrap();

        assert_eq!(claim.user.permission_bit, generate_bit([0, 1]).unwrap());
        assert_eq!(claim.user.display_name, "Alice");
        assert_eq!(claim.user.locale, "en");
        assert_eq!(claim.user.zone_id, "UTC");
        assert_eq!(claim.subject, "alice");
        assert_eq!(claim.audience, "gatehouse-api");
        assert_eq!(claim.expires_at_utc(), now + TOKEN_LIFETIME);
    }

    #[tokio::test]
    async fn root_login_gets_all_ones() {
        let f = fixture();
        let issued = f.auth.login(&uid("root"), "root", Utc::now()).await.unwrap();
        assert!(issued.claim.user.permission_bit.is_root());
    }

    #[tokio::test]
    async fn demo_login_uses_demo_grants() {
        let f = fixture();
        let issued = f.auth.login(&uid("user03"), "user03", Utc::now()).await.unwrap();
        assert_eq!(issued.claim.user.permission_bit, generate_bit([0, 3]).unwrap());
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let f = fixture();
        let err = f.auth.login(&uid("user0"), "nope", Utc::now()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));

        let gw: GatewayError = err.into();
        assert_eq!(gw.auth_failure(), Some(AuthFailure::InvalidCredentials));
    }

    #[tokio::test]
    async fn register_cannot_take_over_root() {
        let f = fixture();
        let err = f
            .auth
            .register(UserRecord::new(uid("root"), "Mallory"), "pw", Utc::now())
            .await
            .unwrap_err();

        let gw: GatewayError = err.into();
        assert_eq!(gw.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn out_of_range_grant_is_internal() {
        let f = fixture();
        f.roles.grant(&uid("user0"), &[9]);

        let err = f.auth.login(&uid("user0"), "user0", Utc::now()).await.unwrap_err();
        assert!(matches!(err, SessionError::Permission(_)));
        let gw: GatewayError = err.into();
        assert_eq!(gw.kind(), ErrorKind::InternalFailure);
    }
}
