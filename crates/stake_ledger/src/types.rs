//! Identifiers, amounts and fixed-point constants shared by the ledger and the engine.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point scale of distribution indexes (18 decimals).
pub const PRECISION_FACTOR: u128 = 1_000_000_000_000_000_000;

/// Token amount in base units.
pub type Amount = u64;

/// Reward owed to an account. Accrual can outgrow any single token transfer, so
/// claims drain it in [`Amount`]-sized payouts.
pub type RewardAmount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Fixed-point distribution index, scaled by [`PRECISION_FACTOR`].
pub type Index = u128;

/// Serde adapter writing `u128` as a decimal string; JSON numbers cannot carry it losslessly.
pub mod u128_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected 20 bytes, got {0}")]
    Length(usize),
}

/// 20-byte identity. The all-zero value is the null identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

/// Identity of a staker (or any holder seen by the custodian).
pub type AccountId = Address;

/// Identity of a tracked asset pool.
pub type AssetId = Address;

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Convenience constructor: low bytes set from `n` (big-endian). Handy for fixtures.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Accepts 40 hex chars with or without `0x`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let raw = hex::decode(s).map_err(|e| AddressError::Hex(e.to_string()))?;
        let bytes: [u8; 20] = raw
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::Length(raw.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
