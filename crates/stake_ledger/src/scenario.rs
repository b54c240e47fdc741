//! Replayable scenario files: initial funding, then a timed list of operations.
//!
//! Drives a [`StakeEngine`] over an [`InMemoryCustodian`] and a [`ManualClock`], so
//! the same file always produces the same snapshot hash.

use crate::clock::{ManualClock, NormalizeError, TimeSpec};
use crate::config::{ConfigError, EngineConfig};
use crate::custody::{Custodian, InMemoryCustodian};
use crate::distribution::DistributionConfig;
use crate::error::StakeError;
use crate::journal::{EventJournal, JournalError};
use crate::staking::StakeEngine;
use crate::types::{AccountId, Amount, AssetId, RewardAmount, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("time: {0}")]
    Time(#[from] NormalizeError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("initialize: {0}")]
    Initialize(StakeError),
    #[error("journal: {0}")]
    Journal(#[from] JournalError),
    #[error("step {step}: time {at} is before current time {now}")]
    TimeWentBackwards { step: usize, at: Timestamp, now: Timestamp },
    #[error("step {step} ({op}): expected {expected}, got {actual}")]
    Expectation {
        step: usize,
        op: &'static str,
        expected: String,
        actual: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Funding {
    pub asset: AssetId,
    pub holder: AccountId,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    /// Emission Controller sets a new rate; `total_staked` is taken from the engine.
    Configure {
        caller: AccountId,
        emission_per_second: Amount,
    },
    Stake {
        account: AccountId,
        #[serde(default)]
        on_behalf_of: Option<AccountId>,
        amount: Amount,
    },
    Cooldown {
        account: AccountId,
    },
    Claim {
        account: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Redeem {
        caller: AccountId,
        amount: Amount,
    },
    /// Assert account state without touching the engine.
    Check {
        account: AccountId,
        #[serde(default)]
        staked: Option<Amount>,
        #[serde(default)]
        claimable: Option<Amount>,
        #[serde(default)]
        total_rewards: Option<Amount>,
        #[serde(default)]
        cooldown: Option<Timestamp>,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Configure { .. } => "configure",
            Action::Stake { .. } => "stake",
            Action::Cooldown { .. } => "cooldown",
            Action::Claim { .. } => "claim",
            Action::Transfer { .. } => "transfer",
            Action::Redeem { .. } => "redeem",
            Action::Check { .. } => "check",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub at: TimeSpec,
    pub action: Action,
    /// Error code the step must fail with (see [`StakeError::code`]); absent means success.
    #[serde(default)]
    pub expect_error: Option<String>,
    /// Amount a claim or redeem must return.
    #[serde(default)]
    pub expect_amount: Option<Amount>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub config: EngineConfig,
    pub owner: AccountId,
    pub emission_controller: AccountId,
    pub start: TimeSpec,
    #[serde(default)]
    pub funding: Vec<Funding>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Result of one step. `error` holds the error code when the operation was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: String,
    pub at: Timestamp,
    pub amount: Option<Amount>,
    pub error: Option<String>,
}

pub struct ScenarioRun {
    pub engine: StakeEngine<InMemoryCustodian, ManualClock>,
    pub clock: ManualClock,
    pub outcomes: Vec<StepOutcome>,
}

/// Replay `scenario`. Committed events are appended to `journal` after every step.
pub fn run_scenario(
    scenario: &Scenario,
    journal: Option<&EventJournal>,
) -> Result<ScenarioRun, ScenarioError> {
    let clock = ManualClock::new(scenario.start.resolve()?);
    let mut custodian = InMemoryCustodian::new()
        .with_vault(scenario.config.reward_asset, scenario.config.reward_vault);
    for f in &scenario.funding {
        custodian.mint(f.asset, f.holder, f.amount);
    }
    let mut engine = StakeEngine::new(scenario.config.clone(), custodian, clock.clone())?;
    engine
        .initialize(scenario.owner, scenario.emission_controller)
        .map_err(ScenarioError::Initialize)?;
    info!(scenario = %scenario.name, steps = scenario.steps.len(), "replaying scenario");

    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (i, step) in scenario.steps.iter().enumerate() {
        let at = step.at.resolve()?;
        if !clock.set(at) {
            return Err(ScenarioError::TimeWentBackwards {
                step: i,
                at,
                now: engine.now(),
            });
        }
        let op = step.action.name();
        let result = apply(&mut engine, &step.action, i)?;
        let (amount, error) = match result {
            Ok(amount) => (amount, None),
            Err(e) => (None, Some(e.code().to_string())),
        };
        debug!(step = i, op, at, ?amount, ?error, "step done");

        if error != step.expect_error {
            return Err(ScenarioError::Expectation {
                step: i,
                op,
                expected: step.expect_error.as_deref().unwrap_or("ok").to_string(),
                actual: error.as_deref().unwrap_or("ok").to_string(),
            });
        }
        if let Some(want) = step.expect_amount {
            if amount != Some(want) {
                return Err(ScenarioError::Expectation {
                    step: i,
                    op,
                    expected: format!("amount {want}"),
                    actual: format!("amount {amount:?}"),
                });
            }
        }
        if let Some(j) = journal {
            j.append(&engine.drain_events())?;
        }
        outcomes.push(StepOutcome {
            step: i,
            op: op.to_string(),
            at,
            amount,
            error,
        });
    }
    Ok(ScenarioRun {
        engine,
        clock,
        outcomes,
    })
}

/// Outer error is a failed `check`; inner is the engine's verdict on the operation.
fn apply(
    engine: &mut StakeEngine<InMemoryCustodian, ManualClock>,
    action: &Action,
    step: usize,
) -> Result<Result<Option<Amount>, StakeError>, ScenarioError> {
    let res = match action {
        Action::Configure {
            caller,
            emission_per_second,
        } => {
            let entry = DistributionConfig {
                asset: engine.config().staked_asset,
                emission_per_second: *emission_per_second,
                total_staked: engine.total_staked(),
            };
            engine.configure_distribution(caller, &[entry]).map(|_| None)
        }
        Action::Stake {
            account,
            on_behalf_of,
            amount,
        } => engine
            .stake_on_behalf(account, on_behalf_of.as_ref().unwrap_or(account), *amount)
            .map(|_| None),
        Action::Cooldown { account } => engine.start_cooldown(account).map(|_| None),
        Action::Claim { account, amount } => engine.claim(account, *amount).map(Some),
        Action::Transfer { from, to, amount } => engine.transfer(from, to, *amount).map(|_| None),
        Action::Redeem { caller, amount } => engine.redeem(caller, *amount).map(Some),
        Action::Check {
            account,
            staked,
            claimable,
            total_rewards,
            cooldown,
        } => {
            let acc = engine.account(account);
            let total = match engine.total_rewards_balance(account) {
                Ok(t) => t,
                Err(e) => return Ok(Err(e)),
            };
            let widen = |v: Option<u64>| v.map(RewardAmount::from);
            let checks = [
                ("staked", widen(*staked), RewardAmount::from(acc.staked_balance)),
                ("claimable", widen(*claimable), acc.claimable_rewards),
                ("total_rewards", widen(*total_rewards), total),
                ("cooldown", widen(*cooldown), RewardAmount::from(acc.cooldown_timestamp)),
            ];
            for (field, want, got) in checks {
                if let Some(want) = want {
                    if want != got {
                        return Err(ScenarioError::Expectation {
                            step,
                            op: "check",
                            expected: format!("{field} {want} for {account}"),
                            actual: format!("{field} {got}"),
                        });
                    }
                }
            }
            Ok(None)
        }
    };
    Ok(res)
}

/// Balance of `asset` for `holder` after a run, as seen by the custodian.
pub fn custody_balance(run: &ScenarioRun, asset: &AssetId, holder: &AccountId) -> Amount {
    run.engine.custodian().balance_of(asset, holder)
}
