//! `gatehouse-core`: shared building blocks for the gateway crates.
//!
//! This crate is transport- and crypto-agnostic: it only carries the error
//! taxonomy, identifiers and the clock abstraction.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock, unix_nanos};
pub use error::{AuthFailure, ErrorKind, GatewayError, GatewayResult};
pub use id::UserId;
