//! User and role directories.
//!
//! The gateway never owns user data; it asks a [`UserDirectory`] for identity
//! and credentials and a [`RoleDirectory`] for granted capability indices. The
//! in-memory implementations back local development and tests.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use async_trait::async_trait;
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;
use tokio::task;

use gatehouse_core::UserId;

use crate::CapabilityIndex;
use crate::permissions::capability;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub locale: Option<String>,
    pub zone_id: Option<String>,
}

impl UserRecord {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            locale: None,
            zone_id: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("invalid user info: {0}")]
    InvalidUserInfo(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, DirectoryError>;

    /// `Ok(false)` for unknown users as well as wrong passwords.
    async fn verify_password(&self, user_id: &UserId, password: &str) -> Result<bool, DirectoryError>;

    async fn register_user(&self, record: UserRecord, password: &str) -> Result<(), DirectoryError>;
}

#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Unknown users have no grants.
    async fn list_granted_indices(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<CapabilityIndex>, DirectoryError>;
}

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    password_hash: String,
}

/// In-memory user store with argon2id password hashes.
///
/// Hashing and verification run on tokio's blocking pool, so callers must be
/// inside a tokio runtime.
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, StoredUser>>,
    hasher: Argon2<'static>,
}

impl core::fmt::Debug for InMemoryUserDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryUserDirectory")
            .field("users", &self.read().len())
            .finish()
    }
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap argon2id parameters for seeded demo accounts.
fn low_cost_hasher() -> Argon2<'static> {
    let params = Params::new(4096, 1, 1, None).unwrap_or_default();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

fn hash_password(hasher: &Argon2<'_>, password: &str) -> Result<String, DirectoryError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

    let phc = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DirectoryError::Unavailable(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn validate_registration(record: &UserRecord, password: &str) -> Result<(), DirectoryError> {
    if record.display_name.trim().is_empty() {
        return Err(DirectoryError::InvalidUserInfo(
            "display name must not be blank".to_string(),
        ));
    }
    if password.trim().is_empty() {
        return Err(DirectoryError::InvalidPassword);
    }
    Ok(())
}

impl InMemoryUserDirectory {
    /// Empty directory using the library's default argon2id cost.
    pub fn new() -> Self {
        Self::with_hasher(Argon2::default())
    }

    pub fn with_hasher(hasher: Argon2<'static>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            hasher,
        }
    }

    /// Cheap argon2id parameters for every registration; tests only.
    pub fn low_cost() -> Self {
        Self::with_hasher(low_cost_hasher())
    }

    /// Seeded with the demo accounts; each password equals the user id.
    ///
    /// Demo hashes use cheap parameters. Later registrations use the
    /// library's default cost.
    pub fn with_demo_users() -> Result<Self, DirectoryError> {
        Self::with_demo_users_using(Argon2::default())
    }

    pub fn with_demo_users_using(hasher: Argon2<'static>) -> Result<Self, DirectoryError> {
        let directory = Self::with_hasher(hasher);
        let seed = low_cost_hasher();
        for (id, name) in DEMO_USERS {
            let user_id = UserId::parse(id)
                .map_err(|e| DirectoryError::InvalidUserInfo(e.message().to_string()))?;
            let record = UserRecord::new(user_id, *name);
            validate_registration(&record, id)?;
            directory.store(record, hash_password(&seed, id)?)?;
        }
        Ok(directory)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, StoredUser>> {
        self.users.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, StoredUser>> {
        self.users.write().unwrap_or_else(|p| p.into_inner())
    }

    async fn hash_off_thread(&self, password: &str) -> Result<String, DirectoryError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        task::spawn_blocking(move || hash_password(&hasher, &password))
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?
    }

    fn store(&self, record: UserRecord, password_hash: String) -> Result<(), DirectoryError> {
        let mut users = self.write();
        if users.contains_key(&record.user_id) {
            return Err(DirectoryError::AlreadyExists(record.user_id.to_string()));
        }
        users.insert(
            record.user_id.clone(),
            StoredUser {
                record,
                password_hash,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.read().get(user_id).map(|u| u.record.clone()))
    }

    async fn verify_password(&self, user_id: &UserId, password: &str) -> Result<bool, DirectoryError> {
        let Some(stored) = self.read().get(user_id).map(|u| u.password_hash.clone()) else {
            return Ok(false);
        };

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let verdict = task::spawn_blocking(move || {
            // Parameters come from the PHC string, not from `hasher`.
            let parsed = PasswordHash::new(&stored).ok()?;
            Some(hasher.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match verdict {
            Some(ok) => Ok(ok),
            None => {
                tracing::error!(user_id = %user_id, "stored password hash is not a valid PHC string");
                Ok(false)
            }
        }
    }

    async fn register_user(&self, record: UserRecord, password: &str) -> Result<(), DirectoryError> {
        validate_registration(&record, password)?;
        if self.read().contains_key(&record.user_id) {
            return Err(DirectoryError::AlreadyExists(record.user_id.to_string()));
        }
        let password_hash = self.hash_off_thread(password).await?;
        self.store(record, password_hash)
    }
}

const DEMO_USERS: &[(&str, &str)] = &[
    ("user0", "User 0"),
    ("user01", "User 01"),
    ("user012", "User 012"),
    ("user03", "User 03"),
    ("user013", "User 013"),
    ("user0123", "User 0123"),
    ("root", "Root"),
];

const DEMO_GRANTS: &[(&str, &[CapabilityIndex])] = &[
    ("user0", &[capability::APP]),
    ("user01", &[capability::APP, capability::APP_DUMMY]),
    (
        "user012",
        &[capability::APP, capability::APP_DUMMY, capability::APP_DUMMY_NEW],
    ),
    ("user03", &[capability::APP, capability::APP_PING]),
    (
        "user013",
        &[capability::APP, capability::APP_DUMMY, capability::APP_PING],
    ),
    (
        "user0123",
        &[
            capability::APP,
            capability::APP_DUMMY,
            capability::APP_DUMMY_NEW,
            capability::APP_PING,
        ],
    ),
    (
        "root",
        &[
            capability::APP,
            capability::APP_DUMMY,
            capability::APP_DUMMY_NEW,
            capability::APP_PING,
        ],
    ),
];

/// In-memory user → capability index grants.
#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    grants: RwLock<HashMap<String, Vec<CapabilityIndex>>>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demo_grants() -> Self {
        let directory = Self::new();
        for (user, indices) in DEMO_GRANTS {
            directory.grant_str(user, indices);
        }
        directory
    }

    /// Replace the grants of `user_id`.
    pub fn grant(&self, user_id: &UserId, indices: &[CapabilityIndex]) {
        self.grant_str(user_id.as_str(), indices);
    }

    fn grant_str(&self, user_id: &str, indices: &[CapabilityIndex]) {
        self.grants
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id.to_string(), indices.to_vec());
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn list_granted_indices(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<CapabilityIndex>, DirectoryError> {
        Ok(self
            .grants
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id.as_str())
            .cloned()
            .unwrap_or_default())
    }
}
