//! Service wiring: keys, directories, token services and background tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use gatehouse_auth::{
    Authenticator, ClaimIssuer, ClaimVerifier, DirectoryError, InMemoryRoleDirectory,
    InMemoryUserDirectory, KeyError, KeySource, RevocationLedger, StaticKeySource,
};
use gatehouse_core::{Clock, SystemClock};

use crate::config::{ApiConfig, KeyConfig};

/// Reads PEM keys from disk on every call, so a rotated file is picked up
/// without a restart.
#[derive(Debug, Clone)]
pub struct FileKeySource {
    private: PathBuf,
    public: PathBuf,
}

impl FileKeySource {
    pub fn new(private: impl Into<PathBuf>, public: impl Into<PathBuf>) -> Self {
        Self {
            private: private.into(),
            public: public.into(),
        }
    }

    async fn read(path: &Path) -> Result<String, KeyError> {
        match tokio::fs::read_to_string(path).await {
            Ok(pem) => Ok(pem),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(KeyError::Unavailable(format!("{} not found", path.display())))
            }
            Err(e) => Err(KeyError::Backend(format!("{}: {e}", path.display()))),
        }
    }
}

#[async_trait]
impl KeySource for FileKeySource {
    async fn signing_key(&self) -> Result<String, KeyError> {
        Self::read(&self.private).await
    }

    async fn verification_key(&self) -> Result<String, KeyError> {
        Self::read(&self.public).await
    }
}

/// Everything the routes need, shared as `Arc<AppServices>`.
pub struct AppServices {
    pub clock: Arc<dyn Clock>,
    pub ledger: Arc<RevocationLedger>,
    pub verifier: Arc<ClaimVerifier>,
    pub authenticator: Arc<Authenticator>,
    /// Kept concrete so operators and tests can grant capabilities.
    pub roles: Arc<InMemoryRoleDirectory>,
}

pub fn build_services(config: &ApiConfig) -> Result<AppServices, DirectoryError> {
    build_services_with_clock(config, Arc::new(SystemClock))
}

pub fn build_services_with_clock(
    config: &ApiConfig,
    clock: Arc<dyn Clock>,
) -> Result<AppServices, DirectoryError> {
    let keys: Arc<dyn KeySource> = match &config.keys {
        KeyConfig::Development => {
            tracing::warn!(
                "JWT_PRIVATE_KEY_FILE / JWT_PUBLIC_KEY_FILE not set; using insecure development keys"
            );
            Arc::new(StaticKeySource::development())
        }
        KeyConfig::Files { private, public } => {
            tracing::info!(private = %private.display(), public = %public.display(), "loading keys from files");
            Arc::new(FileKeySource::new(private.clone(), public.clone()))
        }
    };

    let ledger = Arc::new(RevocationLedger::new());
    let verifier = Arc::new(ClaimVerifier::new(keys.clone(), ledger.clone()));
    let issuer = Arc::new(ClaimIssuer::new(keys));

    let users = Arc::new(InMemoryUserDirectory::with_demo_users()?);
    let roles = Arc::new(InMemoryRoleDirectory::with_demo_grants());
    let authenticator = Arc::new(Authenticator::new(
        users,
        roles.clone(),
        issuer,
        config.session_settings(),
    ));

    Ok(AppServices {
        clock,
        ledger,
        verifier,
        authenticator,
        roles,
    })
}

/// Periodically evict revocation entries whose tokens have expired anyway.
pub fn spawn_revocation_sweeper(
    ledger: Arc<RevocationLedger>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = ledger.compact(clock.now());
            tracing::debug!(evicted, remaining = ledger.len(), "revocation ledger swept");
        }
    })
}
