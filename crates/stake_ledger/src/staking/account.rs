use crate::types::{Amount, RewardAmount, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-account staking state. Zero-initialized on first touch, never removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerAccount {
    pub staked_balance: Amount,
    /// Reward-asset units credited but not yet claimed.
    #[serde(with = "crate::types::u128_string")]
    pub claimable_rewards: RewardAmount,
    /// 0 when idle, otherwise when the current cooldown started.
    pub cooldown_timestamp: Timestamp,
}

impl StakerAccount {
    pub fn is_dormant(&self) -> bool {
        self.staked_balance == 0 && self.claimable_rewards == 0
    }
}
