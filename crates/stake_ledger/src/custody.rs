//! Token custody boundary: moves value in and out of the engine.

use crate::types::{AccountId, Amount, AssetId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("holder {holder} has {available} of {asset}, needs {requested}")]
    InsufficientFunds {
        asset: AssetId,
        holder: AccountId,
        available: Amount,
        requested: Amount,
    },
    #[error("no vault configured for asset {0}")]
    NoVault(AssetId),
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// External value mover. A call either moves the full amount or fails with no effect.
pub trait Custodian {
    /// Move `amount` of `asset` from `source` to `destination`.
    fn pull(
        &mut self,
        asset: &AssetId,
        source: &AccountId,
        destination: &AccountId,
        amount: Amount,
    ) -> Result<(), CustodyError>;

    /// Move `amount` of `asset` out of the vault holding that asset to `destination`.
    fn push(
        &mut self,
        asset: &AssetId,
        destination: &AccountId,
        amount: Amount,
    ) -> Result<(), CustodyError>;

    fn balance_of(&self, asset: &AssetId, holder: &AccountId) -> Amount;
}

/// Balance-table custodian. Each asset pushes from its configured vault.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCustodian {
    balances: HashMap<(AssetId, AccountId), Amount>,
    vaults: HashMap<AssetId, AccountId>,
}

impl InMemoryCustodian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `holder` as the source of `push` for `asset`.
    pub fn with_vault(mut self, asset: AssetId, holder: AccountId) -> Self {
        self.vaults.insert(asset, holder);
        self
    }

    pub fn mint(&mut self, asset: AssetId, holder: AccountId, amount: Amount) {
        let bal = self.balances.entry((asset, holder)).or_default();
        *bal = bal.saturating_add(amount);
    }

    fn move_funds(
        &mut self,
        asset: &AssetId,
        source: &AccountId,
        destination: &AccountId,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        let available = self.balance_of(asset, source);
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                asset: *asset,
                holder: *source,
                available,
                requested: amount,
            });
        }
        let to_before = self.balance_of(asset, destination);
        if source != destination && to_before.checked_add(amount).is_none() {
            return Err(CustodyError::Rejected(format!(
                "balance overflow for {destination}"
            )));
        }
        self.balances.insert((*asset, *source), available - amount);
        let to = self.balances.entry((*asset, *destination)).or_default();
        *to += amount;
        Ok(())
    }
}

impl Custodian for InMemoryCustodian {
    fn pull(
        &mut self,
        asset: &AssetId,
        source: &AccountId,
        destination: &AccountId,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        self.move_funds(asset, source, destination, amount)
    }

    fn push(
        &mut self,
        asset: &AssetId,
        destination: &AccountId,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        let vault = *self.vaults.get(asset).ok_or(CustodyError::NoVault(*asset))?;
        self.move_funds(asset, &vault, destination, amount)
    }

    fn balance_of(&self, asset: &AssetId, holder: &AccountId) -> Amount {
        self.balances.get(&(*asset, *holder)).copied().unwrap_or(0)
    }
}
