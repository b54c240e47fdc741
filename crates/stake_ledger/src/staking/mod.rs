//! Staked balances, claimable rewards and the cooldown state machine.

mod account;
mod cooldown;
mod engine;

pub use account::StakerAccount;
pub use cooldown::{
    check_claim_window, cooldown_phase, next_cooldown_timestamp, CooldownParams, CooldownPhase,
};
pub use engine::StakeEngine;
