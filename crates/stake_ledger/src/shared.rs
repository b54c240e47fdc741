//! Single-writer handle for using one engine from many tasks.

use crate::clock::Clock;
use crate::custody::Custodian;
use crate::staking::StakeEngine;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cloneable handle. Operations are serialized through one async mutex, so each
/// runs against a consistent view of every account and asset record.
pub struct SharedStakeEngine<C, K> {
    inner: Arc<Mutex<StakeEngine<C, K>>>,
}

impl<C, K> Clone for SharedStakeEngine<C, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Custodian, K: Clock> SharedStakeEngine<C, K> {
    pub fn new(engine: StakeEngine<C, K>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub async fn execute<R>(&self, f: impl FnOnce(&mut StakeEngine<C, K>) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    /// Take the engine back once every other handle is gone.
    pub fn into_inner(self) -> Result<StakeEngine<C, K>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
