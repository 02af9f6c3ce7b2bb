//! Bitmask permission algebra.
//!
//! Capability index `i` occupies bit `BIT_LENGTH - i` counted from the low end,
//! so index 0 is the *highest* used bit (value 256) and index 7 is bit 1. This
//! is an inherited wire convention: tokens already in circulation carry masks
//! built this way, so do not renumber it without a compatibility plan.

use core::ops::BitOr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of capability indices a mask can address.
pub const BIT_LENGTH: u8 = 8;

/// Application-defined identifier of one protected operation class.
pub type CapabilityIndex = u8;

/// Capability indices used by the bundled routes.
pub mod capability {
    use super::CapabilityIndex;

    pub const APP: CapabilityIndex = 0;
    pub const APP_DUMMY: CapabilityIndex = 1;
    pub const APP_DUMMY_NEW: CapabilityIndex = 2;
    pub const APP_PING: CapabilityIndex = 3;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("capability index {index} exceeds permission bit length {}", BIT_LENGTH)]
    IndexOutOfRange { index: CapabilityIndex },
}

/// Compact encoding of granted capability indices.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionBit(u64);

impl PermissionBit {
    /// Super-admin sentinel: satisfies every requirement.
    pub const ROOT: PermissionBit = PermissionBit(u64::MAX);
    pub const NONE: PermissionBit = PermissionBit(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// True if every bit of `required` is also set in `self`.
    pub fn contains_all(&self, required: PermissionBit) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for PermissionBit {
    type Output = PermissionBit;

    fn bitor(self, rhs: Self) -> Self::Output {
        PermissionBit(self.0 | rhs.0)
    }
}

impl core::fmt::Display for PermissionBit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

/// Build the mask for a set of granted capability indices.
///
/// Order and duplicates do not matter.
pub fn generate_bit<I>(indices: I) -> Result<PermissionBit, PermissionError>
where
    I: IntoIterator<Item = CapabilityIndex>,
{
    let mut result = PermissionBit::NONE;
    for index in indices {
        if index >= BIT_LENGTH {
            return Err(PermissionError::IndexOutOfRange { index });
        }
        result = result | PermissionBit(1u64 << (BIT_LENGTH - index));
    }
    Ok(result)
}

pub fn generate_root_bit() -> PermissionBit {
    PermissionBit::ROOT
}

/// Any-of-all-of check: `held` must contain every bit of at least one mask in
/// `required`. An empty requirement list denies.
pub fn has_authority(held: PermissionBit, required: &[PermissionBit]) -> bool {
    if held.is_root() {
        return true;
    }
    required.iter().any(|r| held.contains_all(*r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn index_zero_maps_to_highest_used_bit() {
        assert_eq!(generate_bit([0]).unwrap().bits(), 0b1_0000_0000);
        assert_eq!(generate_bit([7]).unwrap().bits(), 0b10);
        assert_eq!(generate_bit([0, 1]).unwrap().bits(), 0b1_1000_0000);
    }

    #[test]
    fn index_out_of_range_fails() {
        assert_eq!(
            generate_bit([8]),
            Err(PermissionError::IndexOutOfRange { index: 8 })
        );
        assert!(generate_bit([0, 3, 200]).is_err());
    }

    #[test]
    fn empty_set_is_none() {
        assert_eq!(generate_bit([]).unwrap(), PermissionBit::NONE);
    }

    #[test]
    fn root_bit_is_all_ones() {
        assert_eq!(generate_root_bit().bits(), u64::MAX);
        assert!(generate_root_bit().is_root());
    }

    #[test]
    fn empty_requirement_denies() {
        let held = generate_bit([0, 1, 2, 3]).unwrap();
        assert!(!has_authority(held, &[]));
    }

    #[test]
    fn any_of_all_of_policy() {
        let alice = generate_bit([0, 1]).unwrap();
        let app_only = generate_bit([0]).unwrap();
        let full_dummy = generate_bit([0, 1, 2]).unwrap();
        let ping = generate_bit([3]).unwrap();

        assert!(has_authority(alice, &[app_only]));
        assert!(!has_authority(alice, &[full_dummy]));
        // One satisfiable alternative is enough.
        assert!(has_authority(alice, &[full_dummy, app_only]));
        assert!(!has_authority(alice, &[full_dummy, ping]));
    }

    #[test]
    fn order_independence_example() {
        assert_eq!(generate_bit([0, 3]), generate_bit([3, 0]));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: root authority satisfies any requirement list, even an empty one.
        #[test]
        fn root_always_has_authority(required in prop::collection::vec(any::<u64>(), 0..8)) {
            let required: Vec<PermissionBit> =
                required.into_iter().map(PermissionBit::from_bits).collect();
            prop_assert!(has_authority(PermissionBit::ROOT, &required));
        }

        /// Property: a non-root mask is never authorized by an empty requirement list.
        #[test]
        fn empty_requirements_never_authorize(held in any::<u64>().prop_filter("non-root", |b| *b != u64::MAX)) {
            prop_assert!(!has_authority(PermissionBit::from_bits(held), &[]));
        }

        /// Property: generate_bit is insensitive to order and duplicates.
        #[test]
        fn generate_bit_is_order_independent(indices in prop::collection::vec(0u8..BIT_LENGTH, 0..16)) {
            let mut reversed = indices.clone();
            reversed.reverse();
            let mut doubled = indices.clone();
            doubled.extend(indices.iter().copied());

            let forward = generate_bit(indices.iter().copied()).unwrap();
            prop_assert_eq!(forward, generate_bit(reversed).unwrap());
            prop_assert_eq!(forward, generate_bit(doubled).unwrap());
        }

        /// Property: a mask always has authority for any subset of its own indices.
        #[test]
        fn granted_superset_has_authority(
            granted in prop::collection::btree_set(0u8..BIT_LENGTH, 1..8),
            take in 0usize..8,
        ) {
            let subset: Vec<u8> = granted.iter().copied().take(take.max(1)).collect();
            let held = generate_bit(granted.iter().copied()).unwrap();
            let required = generate_bit(subset).unwrap();
            prop_assert!(has_authority(held, &[required]));
        }
    }
}
