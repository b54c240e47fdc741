//! Events emitted by committed ledger and engine operations.

use crate::types::{AccountId, Amount, AssetId, Index, RewardAmount, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    ConfigUpdated {
        asset: AssetId,
        emission_per_second: Amount,
    },
    AssetIndexUpdated {
        asset: AssetId,
        #[serde(with = "crate::types::u128_string")]
        index: Index,
    },
    UserIndexUpdated {
        account: AccountId,
        asset: AssetId,
        #[serde(with = "crate::types::u128_string")]
        index: Index,
    },
    Staked {
        from: AccountId,
        on_behalf_of: AccountId,
        amount: Amount,
    },
    RewardsAccrued {
        account: AccountId,
        #[serde(with = "crate::types::u128_string")]
        amount: RewardAmount,
    },
    RewardsClaimed {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    CooldownStarted {
        account: AccountId,
    },
    Transferred {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Redeemed {
        to: AccountId,
        amount: Amount,
    },
}

impl EventKind {
    /// Stable snake_case name, matching the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ConfigUpdated { .. } => "config_updated",
            EventKind::AssetIndexUpdated { .. } => "asset_index_updated",
            EventKind::UserIndexUpdated { .. } => "user_index_updated",
            EventKind::Staked { .. } => "staked",
            EventKind::RewardsAccrued { .. } => "rewards_accrued",
            EventKind::RewardsClaimed { .. } => "rewards_claimed",
            EventKind::CooldownStarted { .. } => "cooldown_started",
            EventKind::Transferred { .. } => "transferred",
            EventKind::Redeemed { .. } => "redeemed",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEvent {
    /// Position in the engine's committed event stream, starting at 0.
    pub seq: u64,
    pub timestamp: Timestamp,
    pub kind: EventKind,
}

/// Committed events in emission order.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    next_seq: u64,
    committed: Vec<LedgerEvent>,
}

impl EventLog {
    /// Append a batch produced by one operation. Called only after the operation committed.
    pub fn commit(&mut self, timestamp: Timestamp, batch: Vec<EventKind>) {
        for kind in batch {
            self.committed.push(LedgerEvent {
                seq: self.next_seq,
                timestamp,
                kind,
            });
            self.next_seq += 1;
        }
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.committed
    }

    /// Hand committed events to a consumer; sequence numbers keep counting.
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.committed)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}
