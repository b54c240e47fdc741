//! Cooldown merge and claim-window checks.

use crate::config::ClaimWindowRule;
use crate::error::StakeError;
use crate::types::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownParams {
    pub cooldown_seconds: u64,
    pub unstake_window: u64,
    pub rule: ClaimWindowRule,
}

/// Where an account sits in the cooldown state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPhase {
    Idle,
    Cooling,
    Claimable,
    WindowFinished,
}

/// Cooldown timestamp of an account after it receives `amount_incoming` staked units.
///
/// `from_cooldown` is the sender's cooldown (0 for fresh stake), `to_cooldown` and
/// `to_balance` are the receiver's values before the amount lands.
pub fn next_cooldown_timestamp(
    params: &CooldownParams,
    now: Timestamp,
    from_cooldown: Timestamp,
    amount_incoming: Amount,
    to_cooldown: Timestamp,
    to_balance: Amount,
) -> Timestamp {
    if to_cooldown == 0 {
        return 0;
    }
    let minimal_valid = now
        .saturating_sub(params.cooldown_seconds)
        .saturating_sub(params.unstake_window);
    if minimal_valid > to_cooldown {
        return 0;
    }
    let from_cooldown = if minimal_valid > from_cooldown {
        now
    } else {
        from_cooldown
    };
    if from_cooldown < to_cooldown {
        return to_cooldown;
    }
    let weight = amount_incoming as u128 + to_balance as u128;
    if weight == 0 {
        return to_cooldown;
    }
    // Weighted mean written as an offset from `to_cooldown` (here `from >= to`):
    // every intermediate fits u128 and the offset is at most `from - to`.
    let offset = amount_incoming as u128 * (from_cooldown - to_cooldown) as u128 / weight;
    to_cooldown + offset as Timestamp
}

/// Gate for `claim`: the cooldown must have elapsed and the window must still be open.
pub fn check_claim_window(
    params: &CooldownParams,
    cooldown_start: Timestamp,
    now: Timestamp,
) -> Result<(), StakeError> {
    if now <= cooldown_start.saturating_add(params.cooldown_seconds) {
        return Err(StakeError::InsufficientCooldown);
    }
    let since_start = now - cooldown_start;
    let window_open = match params.rule {
        // Literal formula: adds the cooldown instead of subtracting it.
        ClaimWindowRule::Literal => since_start
            .checked_add(params.cooldown_seconds)
            .is_some_and(|v| v <= params.unstake_window),
        ClaimWindowRule::SinceMaturity => {
            since_start - params.cooldown_seconds <= params.unstake_window
        }
    };
    if !window_open {
        return Err(StakeError::UnstakeWindowFinished);
    }
    Ok(())
}

pub fn cooldown_phase(
    params: &CooldownParams,
    cooldown_start: Timestamp,
    now: Timestamp,
) -> CooldownPhase {
    if cooldown_start == 0 {
        return CooldownPhase::Idle;
    }
    match check_claim_window(params, cooldown_start, now) {
        Ok(()) => CooldownPhase::Claimable,
        Err(StakeError::InsufficientCooldown) => CooldownPhase::Cooling,
        Err(_) => CooldownPhase::WindowFinished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(cooldown: u64, window: u64) -> CooldownParams {
        CooldownParams {
            cooldown_seconds: cooldown,
            unstake_window: window,
            rule: ClaimWindowRule::Literal,
        }
    }

    #[test]
    fn idle_receiver_stays_idle() {
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 100, 95, 10, 0, 10), 0);
    }

    #[test]
    fn expired_receiver_resets() {
        // minimal_valid = 100 - 10 - 2 = 88 > 80
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 100, 95, 10, 80, 10), 0);
    }

    #[test]
    fn more_mature_receiver_wins() {
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 100, 90, 10, 95, 10), 95);
    }

    #[test]
    fn stale_sender_counts_as_now() {
        // sender cooldown 50 < minimal_valid 88 -> treated as 100; average with 90.
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 100, 50, 10, 90, 30), 92);
        // fresh stake passes 0 as sender cooldown
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 100, 0, 10, 90, 30), 92);
    }

    #[test]
    fn weighted_average_of_fresh_cooldowns() {
        assert_eq!(
            next_cooldown_timestamp(&params(10, 2), 100, 99, 300, 95, 100),
            (300 * 99 + 100 * 95) / 400
        );
    }

    #[test]
    fn early_clock_does_not_underflow() {
        // now < cooldown + window: minimal_valid saturates to 0, nothing counts as stale.
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 5, 0, 10, 3, 10), 3);
        assert_eq!(next_cooldown_timestamp(&params(10, 2), 5, 4, 10, 3, 10), 3);
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let p = params(1_000, 1_000);
        let to = u64::MAX - 100;
        let from = u64::MAX - 2;
        // weights u64::MAX each: mean is halfway, floored
        assert_eq!(
            next_cooldown_timestamp(&p, u64::MAX - 1, from, u64::MAX, to, u64::MAX),
            to + 49
        );
        assert_eq!(
            next_cooldown_timestamp(&p, u64::MAX - 1, from, u64::MAX, to, 0),
            from
        );
    }

    #[test]
    fn literal_window_scenario() {
        let p = params(10, 2);
        assert_eq!(check_claim_window(&p, 5, 6), Err(StakeError::InsufficientCooldown));
        assert_eq!(check_claim_window(&p, 5, 14), Err(StakeError::InsufficientCooldown));
        assert_eq!(check_claim_window(&p, 5, 15), Err(StakeError::InsufficientCooldown));
        assert_eq!(check_claim_window(&p, 5, 16), Err(StakeError::UnstakeWindowFinished));
    }

    #[test]
    fn literal_window_needs_window_above_twice_cooldown() {
        let p = params(10, 100);
        assert_eq!(check_claim_window(&p, 5, 16), Ok(()));
        // 96 - 5 + 10 = 101 > 100
        assert_eq!(check_claim_window(&p, 5, 96), Err(StakeError::UnstakeWindowFinished));
        assert_eq!(check_claim_window(&p, 5, 95), Ok(()));
    }

    #[test]
    fn since_maturity_window() {
        let p = CooldownParams {
            rule: ClaimWindowRule::SinceMaturity,
            ..params(10, 2)
        };
        assert_eq!(check_claim_window(&p, 5, 16), Ok(()));
        assert_eq!(check_claim_window(&p, 5, 17), Ok(()));
        assert_eq!(check_claim_window(&p, 5, 18), Err(StakeError::UnstakeWindowFinished));
    }

    #[test]
    fn phases() {
        let p = params(10, 100);
        assert_eq!(cooldown_phase(&p, 0, 50), CooldownPhase::Idle);
        assert_eq!(cooldown_phase(&p, 5, 10), CooldownPhase::Cooling);
        assert_eq!(cooldown_phase(&p, 5, 20), CooldownPhase::Claimable);
        assert_eq!(cooldown_phase(&p, 5, 200), CooldownPhase::WindowFinished);
    }

    proptest! {
        #[test]
        fn merged_cooldown_is_zero_or_between_inputs(
            now in 0u64..1_000_000,
            from in 0u64..1_000_000,
            to in 0u64..1_000_000,
            amount in 1u64..1_000_000,
            balance in 0u64..1_000_000,
        ) {
            let p = params(1_000, 500);
            let from = from.min(now);
            let to = to.min(now);
            let next = next_cooldown_timestamp(&p, now, from, amount, to, balance);
            prop_assert!(next == 0 || (next >= to && next <= now));
        }
    }
}
