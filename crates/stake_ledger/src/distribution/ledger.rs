//! Per-asset reward index and per-account index snapshots.
//!
//! The ledger never moves value. Callers pass the current time and the staked
//! totals they observe; the ledger turns elapsed time into index growth and index
//! growth into per-account accruals.

use crate::error::StakeError;
use crate::events::EventKind;
use crate::math::{accrued_rewards, index_delta};
use crate::types::{AccountId, Amount, AssetId, Index, RewardAmount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Emission reconfiguration for one asset, as submitted by the Emission Controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub asset: AssetId,
    pub emission_per_second: Amount,
    /// Total staked in the asset as reported by the caller; used to freeze accrual up to now.
    pub total_staked: Amount,
}

/// Scalar part of an asset's distribution state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetData {
    pub emission_per_second: Amount,
    pub last_update_timestamp: Timestamp,
    #[serde(with = "crate::types::u128_string")]
    pub index: Index,
}

#[derive(Clone, Debug, Default)]
pub struct AssetDistribution {
    data: AssetData,
    user_index: HashMap<AccountId, Index>,
}

impl AssetDistribution {
    fn new(now: Timestamp) -> Self {
        Self {
            data: AssetData {
                last_update_timestamp: now,
                ..Default::default()
            },
            user_index: HashMap::new(),
        }
    }

    pub fn data(&self) -> AssetData {
        self.data
    }

    pub fn user_indexes(&self) -> impl Iterator<Item = (&AccountId, &Index)> {
        self.user_index.iter()
    }
}

/// Saved pre-operation state for the records an operation may touch.
#[derive(Clone, Debug)]
pub struct LedgerCheckpoint {
    assets: Vec<(AssetId, Option<AssetData>)>,
    users: Vec<(AssetId, AccountId, Option<Index>)>,
}

/// Index the distribution would reach at `now` given `total_staked`.
fn projected_index(
    data: &AssetData,
    total_staked: Amount,
    now: Timestamp,
    distribution_end: Timestamp,
) -> Result<Index, StakeError> {
    if data.emission_per_second == 0
        || total_staked == 0
        || now <= data.last_update_timestamp
        || data.last_update_timestamp >= distribution_end
    {
        return Ok(data.index);
    }
    let elapsed = now.min(distribution_end) - data.last_update_timestamp;
    let delta = index_delta(data.emission_per_second, elapsed, total_staked)?;
    data.index
        .checked_add(delta)
        .ok_or(StakeError::Overflow("distribution index"))
}

#[derive(Clone, Debug, Default)]
pub struct DistributionLedger {
    emission_controller: AccountId,
    distribution_end: Timestamp,
    assets: HashMap<AssetId, AssetDistribution>,
}

impl DistributionLedger {
    pub fn new(emission_controller: AccountId, distribution_end: Timestamp) -> Self {
        Self {
            emission_controller,
            distribution_end,
            assets: HashMap::new(),
        }
    }

    pub fn emission_controller(&self) -> AccountId {
        self.emission_controller
    }

    pub(crate) fn set_emission_controller(&mut self, controller: AccountId) {
        self.emission_controller = controller;
    }

    pub fn distribution_end(&self) -> Timestamp {
        self.distribution_end
    }

    pub fn asset(&self, asset: &AssetId) -> Option<&AssetDistribution> {
        self.assets.get(asset)
    }

    /// Scalar state of `asset`; zeroes for an asset never touched.
    pub fn asset_data(&self, asset: &AssetId) -> AssetData {
        self.assets.get(asset).map(|d| d.data).unwrap_or_default()
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, &AssetDistribution)> {
        self.assets.iter()
    }

    /// Stored snapshot of `account` for `asset`. Pure read; never accrues.
    pub fn user_index(&self, account: &AccountId, asset: &AssetId) -> Index {
        self.assets
            .get(asset)
            .and_then(|d| d.user_index.get(account))
            .copied()
            .unwrap_or(0)
    }

    /// Apply emission changes in order. Accrual up to now is frozen at the old rate first.
    ///
    /// Authorization is checked once for the whole batch. Any failure restores every
    /// touched asset and removes the events this call pushed.
    pub fn configure_distribution(
        &mut self,
        caller: &AccountId,
        entries: &[DistributionConfig],
        now: Timestamp,
        events: &mut Vec<EventKind>,
    ) -> Result<(), StakeError> {
        if self.emission_controller.is_zero() || *caller != self.emission_controller {
            return Err(StakeError::Unauthorized);
        }
        let assets: Vec<AssetId> = entries.iter().map(|e| e.asset).collect();
        let checkpoint = self.checkpoint(&assets, &[]);
        let pushed_before = events.len();
        for entry in entries {
            if let Err(e) = self.apply_config(entry, now, events) {
                self.restore(checkpoint);
                events.truncate(pushed_before);
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply_config(
        &mut self,
        entry: &DistributionConfig,
        now: Timestamp,
        events: &mut Vec<EventKind>,
    ) -> Result<(), StakeError> {
        self.update_index(&entry.asset, entry.total_staked, now, events)?;
        let dist = self.touch(&entry.asset, now);
        dist.data.emission_per_second = entry.emission_per_second;
        info!(
            asset = %entry.asset,
            emission_per_second = entry.emission_per_second,
            "distribution config updated"
        );
        events.push(EventKind::ConfigUpdated {
            asset: entry.asset,
            emission_per_second: entry.emission_per_second,
        });
        Ok(())
    }

    fn touch(&mut self, asset: &AssetId, now: Timestamp) -> &mut AssetDistribution {
        self.assets
            .entry(*asset)
            .or_insert_with(|| AssetDistribution::new(now))
    }

    /// Bring `asset`'s index up to `now`. A second call at the same instant is a no-op.
    pub fn update_index(
        &mut self,
        asset: &AssetId,
        total_staked: Amount,
        now: Timestamp,
        events: &mut Vec<EventKind>,
    ) -> Result<Index, StakeError> {
        let end = self.distribution_end;
        let dist = self.touch(asset, now);
        if now <= dist.data.last_update_timestamp {
            return Ok(dist.data.index);
        }
        let new_index = projected_index(&dist.data, total_staked, now, end)?;
        if new_index != dist.data.index {
            debug!(asset = %asset, old = %dist.data.index, new = %new_index, "asset index updated");
            dist.data.index = new_index;
            events.push(EventKind::AssetIndexUpdated {
                asset: *asset,
                index: new_index,
            });
        }
        dist.data.last_update_timestamp = now;
        Ok(new_index)
    }

    /// Update the index, then move `account`'s snapshot to it and return what the
    /// account earned holding `staked_by_account` since its previous snapshot.
    pub fn update_account_snapshot(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        staked_by_account: Amount,
        total_staked: Amount,
        now: Timestamp,
        events: &mut Vec<EventKind>,
    ) -> Result<RewardAmount, StakeError> {
        let new_index = self.update_index(asset, total_staked, now, events)?;
        let dist = self.touch(asset, now);
        let old_index = dist.user_index.get(account).copied().unwrap_or(0);
        if old_index == new_index {
            return Ok(0);
        }
        let accrued = if staked_by_account != 0 {
            accrued_rewards(staked_by_account, new_index, old_index)?
        } else {
            0
        };
        dist.user_index.insert(*account, new_index);
        debug!(account = %account, asset = %asset, index = %new_index, accrued, "user index updated");
        events.push(EventKind::UserIndexUpdated {
            account: *account,
            asset: *asset,
            index: new_index,
        });
        Ok(accrued)
    }

    /// What [`Self::update_account_snapshot`] would return at `now`, without mutating.
    pub fn preview_accrual(
        &self,
        account: &AccountId,
        asset: &AssetId,
        staked_by_account: Amount,
        total_staked: Amount,
        now: Timestamp,
    ) -> Result<RewardAmount, StakeError> {
        let Some(dist) = self.assets.get(asset) else {
            return Ok(0);
        };
        let new_index = projected_index(&dist.data, total_staked, now, self.distribution_end)?;
        let old_index = dist.user_index.get(account).copied().unwrap_or(0);
        if old_index == new_index || staked_by_account == 0 {
            return Ok(0);
        }
        accrued_rewards(staked_by_account, new_index, old_index)
    }

    pub fn checkpoint(
        &self,
        assets: &[AssetId],
        users: &[(AssetId, AccountId)],
    ) -> LedgerCheckpoint {
        LedgerCheckpoint {
            assets: assets
                .iter()
                .map(|a| (*a, self.assets.get(a).map(|d| d.data)))
                .collect(),
            users: users
                .iter()
                .map(|(asset, account)| {
                    let idx = self
                        .assets
                        .get(asset)
                        .and_then(|d| d.user_index.get(account))
                        .copied();
                    (*asset, *account, idx)
                })
                .collect(),
        }
    }

    pub fn restore(&mut self, checkpoint: LedgerCheckpoint) {
        for (asset, account, idx) in checkpoint.users {
            if let Some(dist) = self.assets.get_mut(&asset) {
                match idx {
                    Some(i) => dist.user_index.insert(account, i),
                    None => dist.user_index.remove(&account),
                };
            }
        }
        // Restore in reverse so the earliest saved state of a repeated asset wins.
        for (asset, data) in checkpoint.assets.into_iter().rev() {
            match data {
                Some(d) => {
                    if let Some(dist) = self.assets.get_mut(&asset) {
                        dist.data = d;
                    }
                }
                None => {
                    self.assets.remove(&asset);
                }
            }
        }
    }
}
