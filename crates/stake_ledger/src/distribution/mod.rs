//! Reward index accounting: emission rates, indexes, account snapshots.

mod ledger;

pub use ledger::{
    AssetData, AssetDistribution, DistributionConfig, DistributionLedger, LedgerCheckpoint,
};
