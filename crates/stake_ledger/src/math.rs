//! Exact floor fixed-point helpers over checked `u128`.
//!
//! Products are split into quotient and remainder so the widest intermediate is
//! `remainder * scale`, which stays inside `u128` whenever the divisor fits in `u64`.

use crate::error::StakeError;
use crate::types::{Amount, Index, RewardAmount, PRECISION_FACTOR};

/// `floor(a * b / denom)` for `denom <= u64::MAX`.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128, StakeError> {
    if denom == 0 {
        return Err(StakeError::Overflow("division by zero"));
    }
    let q = a / denom;
    let r = a % denom;
    let high = q
        .checked_mul(b)
        .ok_or(StakeError::Overflow("mul_div high part"))?;
    let low = r
        .checked_mul(b)
        .ok_or(StakeError::Overflow("mul_div low part"))?
        / denom;
    high.checked_add(low)
        .ok_or(StakeError::Overflow("mul_div sum"))
}

/// Index growth for `elapsed` seconds of `emission_per_second` spread over `total_staked`.
pub fn index_delta(
    emission_per_second: Amount,
    elapsed: u64,
    total_staked: Amount,
) -> Result<Index, StakeError> {
    let emitted = (emission_per_second as u128) * (elapsed as u128);
    mul_div_floor(emitted, PRECISION_FACTOR, total_staked as u128)
}

/// Rewards owed to `balance` for an index move from `old_index` to `new_index`.
pub fn accrued_rewards(
    balance: Amount,
    new_index: Index,
    old_index: Index,
) -> Result<RewardAmount, StakeError> {
    let diff = new_index
        .checked_sub(old_index)
        .ok_or(StakeError::Overflow("index went backwards"))?;
    let whole = diff / PRECISION_FACTOR;
    let frac = diff % PRECISION_FACTOR;
    let balance = balance as u128;
    balance
        .checked_mul(whole)
        .and_then(|w| w.checked_add(balance * frac / PRECISION_FACTOR))
        .ok_or(StakeError::Overflow("accrued rewards"))
}
