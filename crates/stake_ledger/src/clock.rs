//! Time source for the engine, plus timestamp normalization for config and scenarios.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error("time before unix epoch: {0}")]
    BeforeEpoch(String),
}

/// Source of the current Unix time in seconds. Must never go backwards.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        OffsetDateTime::now_utc().unix_timestamp().max(0) as Timestamp
    }
}

/// Shared, advance-only clock. Clones observe the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Move to `t`. Returns false (and leaves the clock alone) if `t` is in the past.
    pub fn set(&self, t: Timestamp) -> bool {
        self.now.fetch_max(t, Ordering::SeqCst) <= t
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Point in time as written in config and scenario files: Unix seconds or RFC3339.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Seconds(u64),
    Text(String),
}

impl TimeSpec {
    pub fn resolve(&self) -> Result<Timestamp, NormalizeError> {
        match self {
            TimeSpec::Seconds(s) => Ok(*s),
            TimeSpec::Text(s) => parse_timestamp(s),
        }
    }
}

impl From<Timestamp> for TimeSpec {
    fn from(t: Timestamp) -> Self {
        TimeSpec::Seconds(t)
    }
}

/// Parse RFC3339 timestamp and return Unix seconds.
pub fn parse_time_rfc3339(s: &str) -> Result<Timestamp, NormalizeError> {
    let dt = OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map_err(|e| NormalizeError::InvalidTime(e.to_string()))?;
    Timestamp::try_from(dt.unix_timestamp()).map_err(|_| NormalizeError::BeforeEpoch(s.to_string()))
}

/// Decimal input is Unix seconds; anything else must be RFC3339.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, NormalizeError> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    parse_time_rfc3339(s)
}
