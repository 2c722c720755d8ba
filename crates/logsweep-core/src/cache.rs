//! Partition cache with single-flight computation.
//!
//! One `OnceCell` per `(base interval, filter signature)` key. The map lock
//! is only held to fetch or insert the cell; the computation itself runs
//! under the cell, so concurrent callers for the same key wait for the first
//! computation while other keys proceed. A failed computation leaves the cell
//! empty and the next caller computes again.

use crate::filter::FilterSignature;
use crate::interval::Interval;
use crate::window::WindowPlan;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Cache key: base interval plus the filter signature it was planned under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub base: Interval,
    pub signature: FilterSignature,
}

/// How a plan was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Reused a plan computed by an earlier or concurrent caller
    Hit,
    /// This caller ran the computation
    Computed,
}

/// Memoizes window plans for the lifetime of the cache. No eviction.
#[derive(Debug, Default)]
pub struct PartitionCache {
    entries: Mutex<HashMap<PlanKey, Arc<OnceCell<WindowPlan>>>>,
}

impl PartitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached plan for the key, or run `compute` to produce it.
    ///
    /// At most one `compute` runs per key at a time; callers that arrive
    /// during a computation wait for it and share its result.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        base: &Interval,
        signature: &FilterSignature,
        compute: F,
    ) -> Result<(WindowPlan, Lookup), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<WindowPlan, E>>,
    {
        let cell = {
            let mut entries = self.entries.lock();
            let key = PlanKey {
                base: *base,
                signature: signature.clone(),
            };
            Arc::clone(entries.entry(key).or_default())
        };

        let mut computed = false;
        let plan = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await?;

        let lookup = if computed {
            Lookup::Computed
        } else {
            Lookup::Hit
        };
        Ok((plan.clone(), lookup))
    }

    pub fn get(&self, base: &Interval, signature: &FilterSignature) -> Option<WindowPlan> {
        let key = PlanKey {
            base: *base,
            signature: signature.clone(),
        };
        self.entries
            .lock()
            .get(&key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of keys holding a computed plan.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
