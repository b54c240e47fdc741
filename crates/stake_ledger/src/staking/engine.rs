//! Stake accounting engine: balances, claimable rewards, cooldown gating.
//!
//! Every public operation runs through [`StakeEngine::run`]: it reads the clock once,
//! checkpoints the records the operation may touch, and either commits the
//! operation's events or restores the checkpoint. Custodian calls come last inside
//! each operation, so a custody failure unwinds all accounting done before it.

use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::custody::Custodian;
use crate::distribution::{AssetData, DistributionConfig, DistributionLedger, LedgerCheckpoint};
use crate::error::StakeError;
use crate::events::{EventKind, EventLog, LedgerEvent};
use crate::staking::account::StakerAccount;
use crate::staking::cooldown::{
    check_claim_window, cooldown_phase, next_cooldown_timestamp, CooldownParams, CooldownPhase,
};
use crate::types::{AccountId, Amount, AssetId, RewardAmount, Timestamp};
use std::collections::HashMap;
use tracing::{debug, info, warn};

struct EngineCheckpoint {
    ledger: LedgerCheckpoint,
    accounts: Vec<(AccountId, Option<StakerAccount>)>,
    total_staked: Amount,
}

pub struct StakeEngine<C, K> {
    config: EngineConfig,
    params: CooldownParams,
    owner: Option<AccountId>,
    ledger: DistributionLedger,
    accounts: HashMap<AccountId, StakerAccount>,
    total_staked: Amount,
    custodian: C,
    clock: K,
    log: EventLog,
}

impl<C: Custodian, K: Clock> StakeEngine<C, K> {
    /// Build an uninitialized engine. Call [`Self::initialize`] once before use.
    pub fn new(config: EngineConfig, custodian: C, clock: K) -> Result<Self, ConfigError> {
        config.validate()?;
        let distribution_end = config.distribution_end_ts()?;
        let params = CooldownParams {
            cooldown_seconds: config.cooldown_seconds,
            unstake_window: config.unstake_window,
            rule: config.claim_window_rule,
        };
        Ok(Self {
            config,
            params,
            owner: None,
            ledger: DistributionLedger::new(AccountId::ZERO, distribution_end),
            accounts: HashMap::new(),
            total_staked: 0,
            custodian,
            clock,
            log: EventLog::default(),
        })
    }

    pub fn initialize(
        &mut self,
        owner: AccountId,
        emission_controller: AccountId,
    ) -> Result<(), StakeError> {
        if self.owner.is_some() {
            return Err(StakeError::AlreadyInitialized);
        }
        if owner.is_zero() || emission_controller.is_zero() {
            return Err(StakeError::InvalidAddress);
        }
        self.owner = Some(owner);
        self.ledger.set_emission_controller(emission_controller);
        info!(%owner, %emission_controller, staked_asset = %self.config.staked_asset, "engine initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.owner.is_some()
    }

    fn checkpoint(&self, touched: &[AccountId]) -> EngineCheckpoint {
        let asset = self.config.staked_asset;
        let users: Vec<(AssetId, AccountId)> = touched.iter().map(|a| (asset, *a)).collect();
        EngineCheckpoint {
            ledger: self.ledger.checkpoint(&[asset], &users),
            accounts: touched
                .iter()
                .map(|a| (*a, self.accounts.get(a).copied()))
                .collect(),
            total_staked: self.total_staked,
        }
    }

    fn restore(&mut self, checkpoint: EngineCheckpoint) {
        self.ledger.restore(checkpoint.ledger);
        for (id, saved) in checkpoint.accounts.into_iter().rev() {
            match saved {
                Some(acc) => self.accounts.insert(id, acc),
                None => self.accounts.remove(&id),
            };
        }
        self.total_staked = checkpoint.total_staked;
    }

    /// Execute `op` atomically with respect to `touched` accounts and the staked asset.
    fn run<T>(
        &mut self,
        name: &'static str,
        touched: &[AccountId],
        op: impl FnOnce(&mut Self, Timestamp, &mut Vec<EventKind>) -> Result<T, StakeError>,
    ) -> Result<T, StakeError> {
        if self.owner.is_none() {
            return Err(StakeError::NotInitialized);
        }
        let now = self.clock.now();
        let checkpoint = self.checkpoint(touched);
        let mut pending = Vec::new();
        match op(self, now, &mut pending) {
            Ok(v) => {
                self.log.commit(now, pending);
                Ok(v)
            }
            Err(e) => {
                self.restore(checkpoint);
                warn!(op = name, error = %e, "operation rejected; state restored");
                Err(e)
            }
        }
    }

    /// Pull pending accrual for `account` into its claimable balance.
    fn reconcile(
        &mut self,
        account: &AccountId,
        now: Timestamp,
        events: &mut Vec<EventKind>,
    ) -> Result<RewardAmount, StakeError> {
        let balance = self.staked_balance(account);
        let accrued = self.ledger.update_account_snapshot(
            account,
            &self.config.staked_asset,
            balance,
            self.total_staked,
            now,
            events,
        )?;
        if accrued != 0 {
            let acc = self.accounts.entry(*account).or_default();
            acc.claimable_rewards = acc
                .claimable_rewards
                .checked_add(accrued)
                .ok_or(StakeError::Overflow("claimable rewards"))?;
            debug!(%account, accrued, claimable = acc.claimable_rewards, "rewards accrued");
            events.push(EventKind::RewardsAccrued {
                account: *account,
                amount: accrued,
            });
        }
        Ok(accrued)
    }

    /// Emission Controller entry point; see [`DistributionLedger::configure_distribution`].
    pub fn configure_distribution(
        &mut self,
        caller: &AccountId,
        entries: &[DistributionConfig],
    ) -> Result<(), StakeError> {
        self.run("configure_distribution", &[], |eng, now, events| {
            eng.ledger
                .configure_distribution(caller, entries, now, events)
        })
    }

    /// Stake `amount` from `account` for itself.
    pub fn stake(&mut self, account: &AccountId, amount: Amount) -> Result<(), StakeError> {
        self.stake_on_behalf(account, account, amount)
    }

    /// Pull `amount` of the staked asset from `caller` and credit it to `on_behalf_of`.
    pub fn stake_on_behalf(
        &mut self,
        caller: &AccountId,
        on_behalf_of: &AccountId,
        amount: Amount,
    ) -> Result<(), StakeError> {
        self.run("stake", &[*on_behalf_of], |eng, now, events| {
            if amount == 0 {
                return Err(StakeError::InvalidAmount);
            }
            if caller.is_zero() || on_behalf_of.is_zero() {
                return Err(StakeError::InvalidAddress);
            }
            eng.reconcile(on_behalf_of, now, events)?;
            let params = eng.params;
            let total = eng
                .total_staked
                .checked_add(amount)
                .ok_or(StakeError::Overflow("total staked"))?;
            let acc = eng.accounts.entry(*on_behalf_of).or_default();
            let balance = acc
                .staked_balance
                .checked_add(amount)
                .ok_or(StakeError::Overflow("staked balance"))?;
            acc.cooldown_timestamp = next_cooldown_timestamp(
                &params,
                now,
                0,
                amount,
                acc.cooldown_timestamp,
                acc.staked_balance,
            );
            acc.staked_balance = balance;
            eng.total_staked = total;

            let (asset, custody) = (eng.config.staked_asset, eng.config.custody_account);
            eng.custodian.pull(&asset, caller, &custody, amount)?;
            info!(%caller, %on_behalf_of, amount, total_staked = total, "staked");
            events.push(EventKind::Staked {
                from: *caller,
                on_behalf_of: *on_behalf_of,
                amount,
            });
            Ok(())
        })
    }

    pub fn start_cooldown(&mut self, account: &AccountId) -> Result<(), StakeError> {
        self.run("start_cooldown", &[*account], |eng, now, events| {
            let acc = eng
                .accounts
                .get_mut(account)
                .filter(|a| a.staked_balance != 0)
                .ok_or(StakeError::InvalidBalanceOnCooldown)?;
            acc.cooldown_timestamp = now;
            info!(%account, at = now, "cooldown started");
            events.push(EventKind::CooldownStarted { account: *account });
            Ok(())
        })
    }

    /// Claim up to `amount` of rewards inside the unstake window. Returns the amount paid.
    ///
    /// A single payout is capped at `amount`; larger claimable balances are drained
    /// over several claims and the cooldown stays set until the balance reaches zero.
    pub fn claim(&mut self, account: &AccountId, amount: Amount) -> Result<Amount, StakeError> {
        self.run("claim", &[*account], |eng, now, events| {
            if amount == 0 {
                return Err(StakeError::InvalidAmount);
            }
            let cooldown_start = eng.cooldown_timestamp(account);
            check_claim_window(&eng.params, cooldown_start, now)?;
            eng.reconcile(account, now, events)?;

            let acc = eng.accounts.entry(*account).or_default();
            // bounded by `amount`, so it fits the payout type
            let to_claim = acc.claimable_rewards.min(RewardAmount::from(amount)) as Amount;
            acc.claimable_rewards -= RewardAmount::from(to_claim);
            if acc.claimable_rewards == 0 {
                acc.cooldown_timestamp = 0;
            }
            let remaining = acc.claimable_rewards;

            let asset = eng.config.reward_asset;
            eng.custodian.push(&asset, account, to_claim)?;
            info!(%account, requested = amount, claimed = to_claim, remaining, "rewards claimed");
            events.push(EventKind::RewardsClaimed {
                from: *account,
                to: *account,
                amount: to_claim,
            });
            Ok(to_claim)
        })
    }

    /// Move staked position between accounts, merging the receiver's cooldown.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), StakeError> {
        self.run("transfer", &[*from, *to], |eng, now, events| {
            if from.is_zero() || to.is_zero() {
                return Err(StakeError::InvalidAddress);
            }
            if amount == 0 {
                return Err(StakeError::InvalidAmount);
            }
            let available = eng.staked_balance(from);
            if available < amount {
                return Err(StakeError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            }
            eng.reconcile(from, now, events)?;
            if from != to {
                eng.reconcile(to, now, events)?;
                let sender = eng.account(from);
                let receiver = eng.account(to);
                let to_cooldown = next_cooldown_timestamp(
                    &eng.params,
                    now,
                    sender.cooldown_timestamp,
                    amount,
                    receiver.cooldown_timestamp,
                    receiver.staked_balance,
                );
                let to_balance = receiver
                    .staked_balance
                    .checked_add(amount)
                    .ok_or(StakeError::Overflow("staked balance"))?;

                let src = eng.accounts.entry(*from).or_default();
                if src.staked_balance == amount && src.cooldown_timestamp != 0 {
                    src.cooldown_timestamp = 0;
                }
                src.staked_balance -= amount;
                let dst = eng.accounts.entry(*to).or_default();
                dst.cooldown_timestamp = to_cooldown;
                dst.staked_balance = to_balance;
            }
            debug!(%from, %to, amount, "stake transferred");
            events.push(EventKind::Transferred {
                from: *from,
                to: *to,
                amount,
            });
            Ok(())
        })
    }

    /// Owner-only sweep of the staked asset out of custody. Returns the amount moved.
    pub fn redeem(&mut self, caller: &AccountId, amount: Amount) -> Result<Amount, StakeError> {
        self.run("redeem", &[], |eng, _now, events| {
            let owner = eng.owner.ok_or(StakeError::NotInitialized)?;
            if *caller != owner {
                return Err(StakeError::Unauthorized);
            }
            if amount == 0 {
                return Err(StakeError::InvalidAmount);
            }
            let (asset, custody) = (eng.config.staked_asset, eng.config.custody_account);
            let amount = amount.min(eng.custodian.balance_of(&asset, &custody));
            if amount == 0 {
                debug!(%owner, "custody empty; nothing to redeem");
                return Ok(0);
            }
            eng.custodian.pull(&asset, &custody, &owner, amount)?;
            info!(%owner, amount, "redeemed from custody");
            events.push(EventKind::Redeemed { to: owner, amount });
            Ok(amount)
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn owner(&self) -> Option<AccountId> {
        self.owner
    }

    pub fn emission_controller(&self) -> AccountId {
        self.ledger.emission_controller()
    }

    pub fn ledger(&self) -> &DistributionLedger {
        &self.ledger
    }

    pub fn custodian(&self) -> &C {
        &self.custodian
    }

    pub fn custodian_mut(&mut self) -> &mut C {
        &mut self.custodian
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.params.cooldown_seconds
    }

    pub fn unstake_window(&self) -> u64 {
        self.params.unstake_window
    }

    pub fn distribution_end(&self) -> Timestamp {
        self.ledger.distribution_end()
    }

    pub fn account(&self, account: &AccountId) -> StakerAccount {
        self.accounts.get(account).copied().unwrap_or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, &StakerAccount)> {
        self.accounts.iter()
    }

    pub fn staked_balance(&self, account: &AccountId) -> Amount {
        self.account(account).staked_balance
    }

    pub fn claimable_rewards(&self, account: &AccountId) -> RewardAmount {
        self.account(account).claimable_rewards
    }

    pub fn cooldown_timestamp(&self, account: &AccountId) -> Timestamp {
        self.account(account).cooldown_timestamp
    }

    pub fn cooldown_phase(&self, account: &AccountId) -> CooldownPhase {
        cooldown_phase(&self.params, self.cooldown_timestamp(account), self.now())
    }

    pub fn asset_data(&self, asset: &AssetId) -> AssetData {
        self.ledger.asset_data(asset)
    }

    /// Claimable plus what a reconciliation right now would add. Never mutates.
    pub fn total_rewards_balance(&self, account: &AccountId) -> Result<RewardAmount, StakeError> {
        let acc = self.account(account);
        let pending = self.ledger.preview_accrual(
            account,
            &self.config.staked_asset,
            acc.staked_balance,
            self.total_staked,
            self.now(),
        )?;
        acc.claimable_rewards
            .checked_add(pending)
            .ok_or(StakeError::Overflow("total rewards balance"))
    }

    /// Cooldown `to` would get right now if it received `amount` carrying `from_cooldown`.
    pub fn next_cooldown_timestamp(
        &self,
        from_cooldown: Timestamp,
        amount: Amount,
        to: &AccountId,
    ) -> Timestamp {
        let acc = self.account(to);
        next_cooldown_timestamp(
            &self.params,
            self.now(),
            from_cooldown,
            amount,
            acc.cooldown_timestamp,
            acc.staked_balance,
        )
    }

    pub fn events(&self) -> &[LedgerEvent] {
        self.log.events()
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        self.log.drain()
    }

    /// Sequence number the next committed event will carry. Unaffected by draining.
    pub fn next_event_seq(&self) -> u64 {
        self.log.next_seq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::custody::{CustodyError, InMemoryCustodian};
    use crate::types::PRECISION_FACTOR;

    type Engine = StakeEngine<InMemoryCustodian, ManualClock>;

    fn id(n: u64) -> AccountId {
        AccountId::from_low_u64(n)
    }

    const OWNER: u64 = 0xaa;
    const CONTROLLER: u64 = 0xcc;
    const ALICE: u64 = 1;
    const BOB: u64 = 2;

    fn config(cooldown: u64, window: u64) -> EngineConfig {
        EngineConfig {
            cooldown_seconds: cooldown,
            unstake_window: window,
            ..Default::default()
        }
    }

    fn engine_with(config: EngineConfig, emission: Amount) -> (Engine, ManualClock) {
        let clock = ManualClock::new(0);
        let mut custodian = InMemoryCustodian::new().with_vault(config.reward_asset, config.reward_vault);
        for who in [ALICE, BOB] {
            custodian.mint(config.staked_asset, id(who), 1_000_000);
        }
        custodian.mint(config.reward_asset, config.reward_vault, 1_000_000_000);
        let asset = config.staked_asset;
        let mut engine = StakeEngine::new(config, custodian, clock.clone()).unwrap();
        engine.initialize(id(OWNER), id(CONTROLLER)).unwrap();
        engine
            .configure_distribution(
                &id(CONTROLLER),
                &[DistributionConfig {
                    asset,
                    emission_per_second: emission,
                    total_staked: 0,
                }],
            )
            .unwrap();
        (engine, clock)
    }

    #[test]
    fn two_phase_construction() {
        let mut engine =
            StakeEngine::new(EngineConfig::default(), InMemoryCustodian::new(), ManualClock::new(0))
                .unwrap();
        assert_eq!(engine.stake(&id(ALICE), 1), Err(StakeError::NotInitialized));
        assert_eq!(
            engine.initialize(AccountId::ZERO, id(CONTROLLER)),
            Err(StakeError::InvalidAddress)
        );
        engine.initialize(id(OWNER), id(CONTROLLER)).unwrap();
        assert_eq!(
            engine.initialize(id(OWNER), id(CONTROLLER)),
            Err(StakeError::AlreadyInitialized)
        );
        assert_eq!(engine.emission_controller(), id(CONTROLLER));
    }

    #[test]
    fn new_rejects_null_config_identity() {
        let config = EngineConfig {
            staked_asset: AssetId::ZERO,
            ..Default::default()
        };
        assert!(StakeEngine::new(config, InMemoryCustodian::new(), ManualClock::new(0)).is_err());
    }

    #[test]
    fn sole_staker_scenario() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        let alice = id(ALICE);
        engine.stake(&alice, 1000).unwrap();
        assert_eq!(engine.total_staked(), 1000);
        assert_eq!(engine.total_rewards_balance(&alice).unwrap(), 0);

        clock.set(5);
        assert_eq!(engine.total_rewards_balance(&alice).unwrap(), 500);
        engine.start_cooldown(&alice).unwrap();
        assert_eq!(engine.cooldown_timestamp(&alice), 5);
        // start_cooldown does not reconcile
        assert_eq!(engine.claimable_rewards(&alice), 0);

        clock.set(6);
        assert_eq!(engine.claim(&alice, 1), Err(StakeError::InsufficientCooldown));
        clock.set(14);
        assert_eq!(engine.claim(&alice, 1), Err(StakeError::InsufficientCooldown));
        clock.set(16);
        assert_eq!(engine.claim(&alice, 1), Err(StakeError::UnstakeWindowFinished));
        // failed claims leave the ledger untouched
        assert_eq!(engine.asset_data(&engine.config().staked_asset).index, 0);
        assert_eq!(engine.claimable_rewards(&alice), 0);
    }

    #[test]
    fn index_reaches_half_precision_at_five() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        let alice = id(ALICE);
        engine.stake(&alice, 1000).unwrap();
        clock.set(5);
        engine.start_cooldown(&alice).unwrap();
        // a second stake reconciles
        engine.stake(&alice, 1).unwrap();
        let asset = engine.config().staked_asset;
        assert_eq!(engine.asset_data(&asset).index, PRECISION_FACTOR / 2);
        assert_eq!(engine.claimable_rewards(&alice), 500);
    }

    #[test]
    fn claim_inside_wide_window_pays_and_resets() {
        let (mut engine, clock) = engine_with(config(10, 100), 100);
        let alice = id(ALICE);
        engine.stake(&alice, 1000).unwrap();
        clock.set(5);
        engine.start_cooldown(&alice).unwrap();
        clock.set(20);
        let paid = engine.claim(&alice, 600).unwrap();
        assert_eq!(paid, 600);
        assert_eq!(engine.claimable_rewards(&alice), 1400);
        assert_eq!(engine.cooldown_timestamp(&alice), 5);

        let paid = engine.claim(&alice, u64::MAX).unwrap();
        assert_eq!(paid, 1400);
        assert_eq!(engine.claimable_rewards(&alice), 0);
        assert_eq!(engine.cooldown_timestamp(&alice), 0);
        let reward = engine.config().reward_asset;
        assert_eq!(engine.custodian().balance_of(&reward, &alice), 2000);

        let claimed: Vec<Amount> = engine
            .events()
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::RewardsClaimed { amount, .. } => Some(amount),
                _ => None,
            })
            .collect();
        assert_eq!(claimed, vec![600, 1400]);
    }

    #[test]
    fn zero_amounts_rejected() {
        let (mut engine, _clock) = engine_with(config(10, 2), 100);
        assert_eq!(engine.stake(&id(ALICE), 0), Err(StakeError::InvalidAmount));
        assert_eq!(engine.claim(&id(ALICE), 0), Err(StakeError::InvalidAmount));
        assert_eq!(engine.redeem(&id(OWNER), 0), Err(StakeError::InvalidAmount));
        assert_eq!(
            engine.transfer(&id(ALICE), &id(BOB), 0),
            Err(StakeError::InvalidAmount)
        );
    }

    #[test]
    fn cooldown_needs_balance() {
        let (mut engine, _clock) = engine_with(config(10, 2), 100);
        assert_eq!(
            engine.start_cooldown(&id(ALICE)),
            Err(StakeError::InvalidBalanceOnCooldown)
        );
        assert!(engine.events().iter().all(|e| !matches!(e.kind, EventKind::CooldownStarted { .. })));
    }

    #[test]
    fn equal_stakers_split_evenly() {
        let (mut engine, clock) = engine_with(config(10, 2), 7);
        engine.stake(&id(ALICE), 500).unwrap();
        engine.stake(&id(BOB), 500).unwrap();
        clock.set(1_001);
        let a = engine.total_rewards_balance(&id(ALICE)).unwrap();
        let b = engine.total_rewards_balance(&id(BOB)).unwrap();
        let emitted = 7 * 1_001;
        assert!(a.abs_diff(emitted / 2) <= 1);
        assert!(b.abs_diff(emitted / 2) <= 1);
    }

    #[test]
    fn failed_custody_pull_rolls_back() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        let alice = id(ALICE);
        engine.stake(&alice, 1000).unwrap();
        clock.set(5);
        let before_events = engine.events().len();
        let err = engine.stake(&alice, 10_000_000).unwrap_err();
        assert!(matches!(
            err,
            StakeError::Custody(CustodyError::InsufficientFunds { .. })
        ));
        assert_eq!(engine.staked_balance(&alice), 1000);
        assert_eq!(engine.total_staked(), 1000);
        assert_eq!(engine.claimable_rewards(&alice), 0);
        let asset = engine.config().staked_asset;
        assert_eq!(engine.asset_data(&asset).index, 0);
        assert_eq!(engine.ledger().user_index(&alice, &asset), 0);
        assert_eq!(engine.events().len(), before_events);
        // accrual is still intact afterwards
        assert_eq!(engine.total_rewards_balance(&alice).unwrap(), 500);
    }

    #[test]
    fn failed_reward_push_rolls_back_claim() {
        let cfg = config(10, 100);
        let clock = ManualClock::new(0);
        // no reward vault funding
        let mut custodian = InMemoryCustodian::new().with_vault(cfg.reward_asset, cfg.reward_vault);
        custodian.mint(cfg.staked_asset, id(ALICE), 1000);
        let asset = cfg.staked_asset;
        let mut engine = StakeEngine::new(cfg, custodian, clock.clone()).unwrap();
        engine.initialize(id(OWNER), id(CONTROLLER)).unwrap();
        engine
            .configure_distribution(
                &id(CONTROLLER),
                &[DistributionConfig {
                    asset,
                    emission_per_second: 100,
                    total_staked: 0,
                }],
            )
            .unwrap();
        engine.stake(&id(ALICE), 1000).unwrap();
        clock.set(5);
        engine.start_cooldown(&id(ALICE)).unwrap();
        clock.set(20);
        assert!(engine.claim(&id(ALICE), 100).is_err());
        assert_eq!(engine.claimable_rewards(&id(ALICE)), 0);
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 5);
        assert_eq!(engine.total_rewards_balance(&id(ALICE)).unwrap(), 2000);
    }

    #[test]
    fn full_transfer_resets_sender_cooldown() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        engine.stake(&id(ALICE), 400).unwrap();
        clock.set(3);
        engine.start_cooldown(&id(ALICE)).unwrap();
        clock.set(4);
        engine.transfer(&id(ALICE), &id(BOB), 400).unwrap();
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 0);
        assert_eq!(engine.staked_balance(&id(ALICE)), 0);
        assert_eq!(engine.staked_balance(&id(BOB)), 400);
        // receiver had no cooldown, so none is inherited
        assert_eq!(engine.cooldown_timestamp(&id(BOB)), 0);
        // sender was reconciled before the move: 4s * 100/s
        assert_eq!(engine.claimable_rewards(&id(ALICE)), 400);
        assert_eq!(engine.total_staked(), 400);
    }

    #[test]
    fn partial_transfer_keeps_sender_cooldown_and_merges_receiver() {
        let (mut engine, clock) = engine_with(config(100, 50), 0);
        engine.stake(&id(ALICE), 300).unwrap();
        engine.stake(&id(BOB), 100).unwrap();
        clock.set(10);
        engine.start_cooldown(&id(BOB)).unwrap();
        clock.set(20);
        engine.start_cooldown(&id(ALICE)).unwrap();
        clock.set(30);
        engine.transfer(&id(ALICE), &id(BOB), 300).unwrap();
        // full balance moved: alice reset; bob = (300*20 + 100*10) / 400
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 0);
        assert_eq!(engine.cooldown_timestamp(&id(BOB)), 17);

        engine.stake(&id(ALICE), 50).unwrap();
        clock.set(40);
        engine.start_cooldown(&id(ALICE)).unwrap();
        engine.transfer(&id(ALICE), &id(BOB), 10).unwrap();
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 40);
        assert_eq!(engine.cooldown_timestamp(&id(BOB)), (10 * 40 + 400 * 17) / 410);
    }

    #[test]
    fn transfer_validation() {
        let (mut engine, _clock) = engine_with(config(10, 2), 100);
        engine.stake(&id(ALICE), 10).unwrap();
        assert_eq!(
            engine.transfer(&AccountId::ZERO, &id(BOB), 1),
            Err(StakeError::InvalidAddress)
        );
        assert_eq!(
            engine.transfer(&id(ALICE), &AccountId::ZERO, 1),
            Err(StakeError::InvalidAddress)
        );
        assert_eq!(
            engine.transfer(&id(ALICE), &id(BOB), 11),
            Err(StakeError::InsufficientBalance {
                available: 10,
                requested: 11
            })
        );
    }

    #[test]
    fn self_transfer_keeps_balances() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        engine.stake(&id(ALICE), 10).unwrap();
        clock.set(2);
        engine.start_cooldown(&id(ALICE)).unwrap();
        engine.transfer(&id(ALICE), &id(ALICE), 10).unwrap();
        assert_eq!(engine.staked_balance(&id(ALICE)), 10);
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 2);
        assert_eq!(engine.claimable_rewards(&id(ALICE)), 200);
    }

    #[test]
    fn stake_on_stale_cooldown_resets_it() {
        let (mut engine, clock) = engine_with(config(10, 2), 0);
        engine.stake(&id(ALICE), 10).unwrap();
        clock.set(20);
        engine.start_cooldown(&id(ALICE)).unwrap();
        clock.set(40);
        // minimal_valid = 28 > 20
        engine.stake(&id(ALICE), 10).unwrap();
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 0);
    }

    #[test]
    fn stake_into_live_cooldown_averages_toward_now() {
        let (mut engine, clock) = engine_with(config(10, 2), 0);
        engine.stake(&id(ALICE), 30).unwrap();
        clock.set(20);
        engine.start_cooldown(&id(ALICE)).unwrap();
        clock.set(24);
        assert_eq!(engine.next_cooldown_timestamp(0, 10, &id(ALICE)), 21);
        engine.stake(&id(ALICE), 10).unwrap();
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 21);
    }

    #[test]
    fn redeem_is_owner_only_and_capped() {
        let (mut engine, _clock) = engine_with(config(10, 2), 0);
        engine.stake(&id(ALICE), 300).unwrap();
        assert_eq!(engine.redeem(&id(ALICE), 1), Err(StakeError::Unauthorized));
        assert_eq!(engine.redeem(&id(OWNER), 1_000), Ok(300));
        let asset = engine.config().staked_asset;
        assert_eq!(engine.custodian().balance_of(&asset, &id(OWNER)), 300);
        // accounting is untouched
        assert_eq!(engine.staked_balance(&id(ALICE)), 300);
        assert_eq!(engine.total_staked(), 300);
    }

    #[test]
    fn configure_requires_controller() {
        let (mut engine, _clock) = engine_with(config(10, 2), 0);
        let asset = engine.config().staked_asset;
        assert_eq!(
            engine.configure_distribution(
                &id(OWNER),
                &[DistributionConfig {
                    asset,
                    emission_per_second: 1,
                    total_staked: 0
                }]
            ),
            Err(StakeError::Unauthorized)
        );
        assert_eq!(engine.asset_data(&asset).emission_per_second, 0);
    }

    #[test]
    fn zero_emission_never_accrues() {
        let (mut engine, clock) = engine_with(config(10, 2), 0);
        engine.stake(&id(ALICE), 10).unwrap();
        clock.set(1_000);
        engine.stake(&id(BOB), 10).unwrap();
        clock.set(5_000);
        engine.transfer(&id(ALICE), &id(BOB), 5).unwrap();
        let asset = engine.config().staked_asset;
        assert_eq!(engine.asset_data(&asset).index, 0);
        assert_eq!(engine.claimable_rewards(&id(ALICE)), 0);
        assert_eq!(engine.claimable_rewards(&id(BOB)), 0);
    }

    #[test]
    fn events_follow_commit_order() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        engine.drain_events();
        engine.stake(&id(ALICE), 1000).unwrap();
        clock.set(5);
        engine.stake(&id(ALICE), 1).unwrap();
        let names: Vec<&str> = engine.events().iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            names,
            vec![
                "staked",
                "asset_index_updated",
                "user_index_updated",
                "rewards_accrued",
                "staked"
            ]
        );
        assert!(engine.events().windows(2).all(|w| w[0].seq + 1 == w[1].seq));
    }

    #[test]
    fn receiver_accrues_at_pre_transfer_balance() {
        let (mut engine, clock) = engine_with(config(10, 2), 100);
        engine.stake(&id(ALICE), 1000).unwrap();
        clock.set(5);
        engine.stake(&id(BOB), 1000).unwrap();
        clock.set(10);
        engine.transfer(&id(ALICE), &id(BOB), 500).unwrap();
        // alice: 5s alone + 5s at half share; bob: 5s at half share
        assert_eq!(engine.claimable_rewards(&id(ALICE)), 750);
        assert_eq!(engine.claimable_rewards(&id(BOB)), 250);

        clock.set(20);
        let alice = engine.total_rewards_balance(&id(ALICE)).unwrap();
        let bob = engine.total_rewards_balance(&id(BOB)).unwrap();
        assert_eq!(alice, 500 + 250 + 250);
        assert_eq!(bob, 250 + 750);
        assert_eq!(alice + bob, 100 * 20);
    }

    #[test]
    fn accrual_beyond_u64_stays_claimable() {
        let emission: Amount = 10_000_000_000_000;
        let cfg = config(10, 100);
        let clock = ManualClock::new(0);
        let mut custodian = InMemoryCustodian::new().with_vault(cfg.reward_asset, cfg.reward_vault);
        custodian.mint(cfg.staked_asset, id(ALICE), 10);
        custodian.mint(cfg.reward_asset, cfg.reward_vault, u64::MAX);
        let asset = cfg.staked_asset;
        let mut engine = StakeEngine::new(cfg, custodian, clock.clone()).unwrap();
        engine.initialize(id(OWNER), id(CONTROLLER)).unwrap();
        engine
            .configure_distribution(
                &id(CONTROLLER),
                &[DistributionConfig {
                    asset,
                    emission_per_second: emission,
                    total_staked: 0,
                }],
            )
            .unwrap();
        engine.stake(&id(ALICE), 1).unwrap();
        clock.set(2_000_000);
        engine.start_cooldown(&id(ALICE)).unwrap();
        clock.set(2_000_011);

        let owed = RewardAmount::from(emission) * 2_000_011;
        assert!(owed > RewardAmount::from(u64::MAX));
        assert_eq!(engine.total_rewards_balance(&id(ALICE)).unwrap(), owed);

        let paid = engine.claim(&id(ALICE), u64::MAX).unwrap();
        assert_eq!(paid, u64::MAX);
        let remaining = owed - RewardAmount::from(u64::MAX);
        assert_eq!(engine.claimable_rewards(&id(ALICE)), remaining);
        // cooldown holds until the balance is fully drained
        assert_eq!(engine.cooldown_timestamp(&id(ALICE)), 2_000_000);
        let reward = engine.config().reward_asset;
        assert_eq!(engine.custodian().balance_of(&reward, &id(ALICE)), u64::MAX);

        // the position is still movable
        engine.stake(&id(ALICE), 1).unwrap();
        engine.transfer(&id(ALICE), &id(BOB), 2).unwrap();
        assert_eq!(engine.staked_balance(&id(BOB)), 2);
        assert_eq!(engine.claimable_rewards(&id(ALICE)), remaining);
    }

    #[test]
    fn redeem_from_empty_custody_is_a_noop() {
        let (mut engine, _clock) = engine_with(config(10, 2), 0);
        let before = engine.next_event_seq();
        assert_eq!(engine.redeem(&id(OWNER), 50), Ok(0));
        assert_eq!(engine.next_event_seq(), before);
        assert!(engine
            .events()
            .iter()
            .all(|e| !matches!(e.kind, EventKind::Redeemed { .. })));
    }

    #[test]
    fn phase_tracks_state_machine() {
        let (mut engine, clock) = engine_with(config(10, 100), 100);
        engine.stake(&id(ALICE), 10).unwrap();
        assert_eq!(engine.cooldown_phase(&id(ALICE)), CooldownPhase::Idle);
        clock.set(5);
        engine.start_cooldown(&id(ALICE)).unwrap();
        assert_eq!(engine.cooldown_phase(&id(ALICE)), CooldownPhase::Cooling);
        clock.set(20);
        assert_eq!(engine.cooldown_phase(&id(ALICE)), CooldownPhase::Claimable);
        engine.claim(&id(ALICE), u64::MAX).unwrap();
        assert_eq!(engine.cooldown_phase(&id(ALICE)), CooldownPhase::Idle);
    }
}
