//! Engine configuration: assets, custody identities, cooldown timing.
//!
//! Load from: env `STAKE_LEDGER_CONFIG_PATH`, or `./config/stake_ledger.json`, or
//! `./stake_ledger.json`. Missing files fall back to [`EngineConfig::default`].

use crate::clock::{NormalizeError, TimeSpec};
use crate::error::StakeError;
use crate::types::{AccountId, AssetId, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "STAKE_LEDGER_CONFIG_PATH";

const DEFAULT_COOLDOWN_SECONDS: u64 = 864_000;
const DEFAULT_UNSTAKE_WINDOW: u64 = 172_800;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("distribution_end: {0}")]
    Time(#[from] NormalizeError),
    #[error("invalid config: {0}")]
    Invalid(#[from] StakeError),
}

/// How `claim` checks that the caller is still inside the unstake window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimWindowRule {
    /// `now - cooldown_start + cooldown_seconds <= unstake_window`. Default.
    #[default]
    Literal,
    /// `now - cooldown_start - cooldown_seconds <= unstake_window`.
    SinceMaturity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Asset staked into the engine; also the key of its reward distribution.
    pub staked_asset: AssetId,
    /// Asset paid out on claim.
    pub reward_asset: AssetId,
    /// Holder of staked funds on the custodian side.
    pub custody_account: AccountId,
    /// Holder that funds reward payouts.
    pub reward_vault: AccountId,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_window")]
    pub unstake_window: u64,
    #[serde(default = "default_distribution_end")]
    pub distribution_end: TimeSpec,
    #[serde(default)]
    pub claim_window_rule: ClaimWindowRule,
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECONDS
}

fn default_window() -> u64 {
    DEFAULT_UNSTAKE_WINDOW
}

fn default_distribution_end() -> TimeSpec {
    TimeSpec::Seconds(Timestamp::MAX)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staked_asset: AssetId::from_low_u64(1),
            reward_asset: AssetId::from_low_u64(2),
            custody_account: AccountId::from_low_u64(3),
            reward_vault: AccountId::from_low_u64(4),
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            unstake_window: DEFAULT_UNSTAKE_WINDOW,
            distribution_end: default_distribution_end(),
            claim_window_rule: ClaimWindowRule::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.distribution_end_ts()?;
        Ok(config)
    }

    /// Env path first, then the two conventional locations, else defaults.
    pub fn load() -> Self {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            candidates.push(std::path::PathBuf::from(path));
        }
        candidates.push("./config/stake_ledger.json".into());
        candidates.push("./stake_ledger.json".into());
        for p in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_path(p) {
                Ok(c) => return c,
                Err(e) => warn!(path = %p.display(), error = %e, "ignoring unreadable config"),
            }
        }
        Self::default()
    }

    pub fn distribution_end_ts(&self) -> Result<Timestamp, NormalizeError> {
        self.distribution_end.resolve()
    }

    /// Null identities for assets or custody holders are rejected.
    pub fn validate(&self) -> Result<(), StakeError> {
        let ids = [
            self.staked_asset,
            self.reward_asset,
            self.custody_account,
            self.reward_vault,
        ];
        if ids.iter().any(|a| a.is_zero()) {
            return Err(StakeError::InvalidAddress);
        }
        Ok(())
    }
}
