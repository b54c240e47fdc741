//! stake_ledger: index-based staking reward accounting with cooldown-gated claims.
//!
//! Rewards accrue lazily per asset through a cumulative index; each account keeps a
//! snapshot of the index it was last reconciled at. Claims are only allowed inside
//! the unstake window that follows an account's cooldown. Token movement is left to
//! a pluggable [`Custodian`].

pub mod clock;
pub mod config;
pub mod custody;
pub mod distribution;
pub mod error;
pub mod events;
pub mod journal;
pub mod math;
pub mod scenario;
pub mod shared;
pub mod snapshot;
pub mod staking;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock, TimeSpec};
pub use config::{ClaimWindowRule, EngineConfig};
pub use custody::{Custodian, CustodyError, InMemoryCustodian};
pub use distribution::{AssetData, DistributionConfig, DistributionLedger};
pub use error::StakeError;
pub use events::{EventKind, LedgerEvent};
pub use journal::EventJournal;
pub use scenario::{run_scenario, Scenario, ScenarioRun};
pub use shared::SharedStakeEngine;
pub use snapshot::{snapshot_hash, verify_snapshot_hash, LedgerSnapshot, VerificationResult};
pub use staking::{CooldownPhase, StakeEngine, StakerAccount};
pub use types::{
    AccountId, Address, Amount, AssetId, Index, RewardAmount, Timestamp, PRECISION_FACTOR,
};
