//! `gatehouse-auth`: token lifecycle and permission model (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP: it issues and verifies
//! signed claims, tracks revocations and evaluates permission bitmasks. User,
//! role and key storage are injected through the traits in [`directory`] and
//! [`keys`].

pub mod claims;
pub mod directory;
pub mod keys;
pub mod permissions;
pub mod principal;
pub mod revocation;
pub mod sessions;
pub mod token;

pub use claims::{Claim, TOKEN_LIFETIME, TokenValidationError, validate_claims};
pub use directory::{
    DirectoryError, InMemoryRoleDirectory, InMemoryUserDirectory, RoleDirectory, UserDirectory,
    UserRecord,
};
pub use keys::{KeyError, KeySource, StaticKeySource};
pub use permissions::{
    BIT_LENGTH, CapabilityIndex, PermissionBit, PermissionError, generate_bit, generate_root_bit,
    has_authority,
};
pub use principal::UserContext;
pub use revocation::RevocationLedger;
pub use sessions::{Authenticator, SessionError, SessionSettings};
pub use token::{ClaimIssuer, ClaimVerifier, IssuedToken, TokenError};
