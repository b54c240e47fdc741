//! Deterministic engine snapshot and SHA-256 state hash.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::custody::Custodian;
use crate::distribution::AssetData;
use crate::staking::{StakeEngine, StakerAccount};
use crate::types::{AccountId, Amount, AssetId, Index, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIndexEntry {
    pub account: AccountId,
    #[serde(with = "crate::types::u128_string")]
    pub index: Index,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub asset: AssetId,
    pub data: AssetData,
    /// Sorted by account.
    pub user_indexes: Vec<UserIndexEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: AccountId,
    pub state: StakerAccount,
}

/// Full accounting state at one instant. Collections are sorted, so equal state
/// always serializes to equal JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub taken_at: Timestamp,
    pub config: EngineConfig,
    pub owner: Option<AccountId>,
    pub emission_controller: AccountId,
    pub total_staked: Amount,
    pub assets: Vec<AssetSnapshot>,
    pub accounts: Vec<AccountSnapshot>,
    /// Sequence number the next committed event will get.
    pub next_event_seq: u64,
}

impl LedgerSnapshot {
    pub fn from_engine<C: Custodian, K: Clock>(engine: &StakeEngine<C, K>) -> Self {
        let mut assets: Vec<AssetSnapshot> = engine
            .ledger()
            .assets()
            .map(|(asset, dist)| {
                let mut user_indexes: Vec<UserIndexEntry> = dist
                    .user_indexes()
                    .map(|(account, index)| UserIndexEntry {
                        account: *account,
                        index: *index,
                    })
                    .collect();
                user_indexes.sort_by_key(|u| u.account);
                AssetSnapshot {
                    asset: *asset,
                    data: dist.data(),
                    user_indexes,
                }
            })
            .collect();
        assets.sort_by_key(|a| a.asset);

        let mut accounts: Vec<AccountSnapshot> = engine
            .accounts()
            .map(|(account, state)| AccountSnapshot {
                account: *account,
                state: *state,
            })
            .collect();
        accounts.sort_by_key(|a| a.account);

        Self {
            version: SNAPSHOT_VERSION,
            taken_at: engine.now(),
            config: engine.config().clone(),
            owner: engine.owner(),
            emission_controller: engine.emission_controller(),
            total_staked: engine.total_staked(),
            assets,
            accounts,
            next_event_seq: engine.next_event_seq(),
        }
    }

    pub fn account(&self, account: &AccountId) -> Option<&StakerAccount> {
        self.accounts
            .iter()
            .find(|a| a.account == *account)
            .map(|a| &a.state)
    }

    /// Sum of every account's staked balance; equals `total_staked` for a consistent engine.
    pub fn sum_of_balances(&self) -> u128 {
        self.accounts
            .iter()
            .map(|a| a.state.staked_balance as u128)
            .sum()
    }
}

/// Normalize JSON for hashing: sort keys and no whitespace.
pub fn normalize_for_hash(value: &serde_json::Value) -> Result<String, SnapshotError> {
    let sorted = sort_json_keys(value);
    Ok(serde_json::to_string(&sorted)?)
}

fn sort_json_keys(v: &serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(m) => {
            let out: std::collections::BTreeMap<String, serde_json::Value> = m
                .iter()
                .map(|(k, v)| (k.clone(), sort_json_keys(v)))
                .collect();
            serde_json::Value::Object(serde_json::Map::from_iter(out))
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 over normalized snapshot JSON, hex encoded.
pub fn snapshot_hash(snapshot: &LedgerSnapshot) -> Result<String, SnapshotError> {
    let json = serde_json::to_value(snapshot)?;
    let normalized = normalize_for_hash(&json)?;
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub snapshot_hash: String,
    pub expected_hash: Option<String>,
    pub matches: bool,
}

/// Compare a snapshot against expected hex (e.g. contents of a `.sha256` file).
pub fn verify_snapshot_hash(
    snapshot: &LedgerSnapshot,
    expected_hex: &str,
) -> Result<VerificationResult, SnapshotError> {
    let snapshot_hash = snapshot_hash(snapshot)?;
    let expected = expected_hex.trim().to_lowercase();
    let matches = snapshot_hash == expected;
    Ok(VerificationResult {
        snapshot_hash,
        expected_hash: Some(expected),
        matches,
    })
}
