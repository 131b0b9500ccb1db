use crate::domain::ledger::LedgerEntry;
use crate::domain::money::Balance;
use crate::domain::pool::{BalancePool, BusinessUnitId, PoolKind};
use crate::domain::ports::{CommitOutcome, LedgerStoreRef};
use crate::error::{LedgerError, Result};
use chrono::Utc;

/// What an adjustment is allowed to do to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Any resulting balance is accepted.
    None,
    /// Reject with `InsufficientFunds` if the pool would go negative.
    NonNegative,
}

/// Outcome of a successful adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub balance: Balance,
    /// The entry as stored, when one accompanied the adjustment.
    pub entry: Option<LedgerEntry>,
    /// The accompanying entry was already recorded; nothing was written.
    pub duplicate: bool,
}

/// Owns the two balance pools of every business unit.
///
/// Every mutation is a read, a compute and a versioned commit. When another writer
/// got in between, the commit reports a conflict and the whole step is retried
/// from a fresh read, so concurrent adjustments never overwrite each other.
pub struct BalanceBook {
    store: LedgerStoreRef,
    max_attempts: u32,
}

impl BalanceBook {
    pub fn new(store: LedgerStoreRef, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates both pools with a zero amount if they don't exist yet.
    pub async fn ensure_pools(&self, unit: &BusinessUnitId) -> Result<()> {
        for kind in PoolKind::ALL {
            let created = self
                .store
                .insert_pool_if_absent(BalancePool::empty(unit.clone(), kind, Utc::now()))
                .await?;
            if created {
                tracing::info!(business_unit = %unit, pool = %kind, "balance pool created");
            }
        }
        Ok(())
    }

    pub async fn read(&self, unit: &BusinessUnitId, kind: PoolKind) -> Result<Balance> {
        Ok(self.load(unit, kind).await?.amount)
    }

    pub async fn pool(&self, unit: &BusinessUnitId, kind: PoolKind) -> Result<BalancePool> {
        self.load(unit, kind).await
    }

    /// Atomically adds `delta` to the pool and returns the new amount.
    pub async fn adjust(
        &self,
        unit: &BusinessUnitId,
        kind: PoolKind,
        delta: Balance,
        guard: Guard,
    ) -> Result<Balance> {
        self.apply(unit, kind, delta, guard, None)
            .await
            .map(|applied| applied.balance)
    }

    /// Adjusts the pool and appends `entry` in the same commit.
    pub(crate) async fn apply(
        &self,
        unit: &BusinessUnitId,
        kind: PoolKind,
        delta: Balance,
        guard: Guard,
        entry: Option<LedgerEntry>,
    ) -> Result<Applied> {
        for attempt in 1..=self.max_attempts {
            let current = self.load(unit, kind).await?;
            let now = Utc::now();
            let next = current.adjusted(delta, now);

            if guard == Guard::NonNegative && next.amount.is_negative() {
                return Err(LedgerError::InsufficientFunds {
                    pool: kind,
                    available: current.amount.value(),
                    requested: (-delta).value(),
                });
            }

            let stamped = entry.clone().map(|mut e| {
                e.timestamp = Some(now);
                e
            });
            match self
                .store
                .commit(current.version, next.clone(), stamped.clone())
                .await?
            {
                CommitOutcome::Committed => {
                    tracing::debug!(
                        business_unit = %unit,
                        pool = %kind,
                        delta = %delta,
                        balance = %next.amount,
                        version = next.version,
                        "pool adjusted"
                    );
                    return Ok(Applied {
                        balance: next.amount,
                        entry: stamped,
                        duplicate: false,
                    });
                }
                CommitOutcome::DuplicateEntry => {
                    let stored = match &entry {
                        Some(e) => self.store.entry(&e.id).await?,
                        None => None,
                    };
                    return Ok(Applied {
                        balance: current.amount,
                        entry: stored.or(entry),
                        duplicate: true,
                    });
                }
                CommitOutcome::VersionConflict => {
                    tracing::debug!(
                        business_unit = %unit,
                        pool = %kind,
                        attempt,
                        "concurrent pool update, retrying"
                    );
                    tokio::task::yield_now().await;
                }
            }
        }

        tracing::warn!(business_unit = %unit, pool = %kind, "pool adjustment gave up after retries");
        Err(LedgerError::Contention(BalancePool::key(unit, kind)))
    }

    async fn load(&self, unit: &BusinessUnitId, kind: PoolKind) -> Result<BalancePool> {
        if let Some(pool) = self.store.get_pool(unit, kind).await? {
            return Ok(pool);
        }
        self.ensure_pools(unit).await?;
        self.store
            .get_pool(unit, kind)
            .await?
            .ok_or_else(|| LedgerError::internal(format!("pool {unit}/{kind} vanished")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn unit() -> BusinessUnitId {
        BusinessUnitId::new("resto").unwrap()
    }

    fn book() -> BalanceBook {
        BalanceBook::new(Arc::new(InMemoryLedgerStore::new()), 16)
    }

    #[tokio::test]
    async fn test_pools_created_lazily() {
        let book = book();
        assert_eq!(book.read(&unit(), PoolKind::Virtual).await.unwrap(), Balance::ZERO);

        // ensure_pools is a no-op once they exist
        book.adjust(&unit(), PoolKind::Cash, Balance::new(dec!(5)), Guard::None)
            .await
            .unwrap();
        book.ensure_pools(&unit()).await.unwrap();
        assert_eq!(
            book.read(&unit(), PoolKind::Cash).await.unwrap(),
            Balance::new(dec!(5))
        );
    }

    #[tokio::test]
    async fn test_adjust_updates_timestamp() {
        let book = book();
        book.ensure_pools(&unit()).await.unwrap();
        let before = book.pool(&unit(), PoolKind::Cash).await.unwrap();

        book.adjust(&unit(), PoolKind::Cash, Balance::new(dec!(1)), Guard::None)
            .await
            .unwrap();

        let after = book.pool(&unit(), PoolKind::Cash).await.unwrap();
        assert!(after.last_updated_at >= before.last_updated_at);
        assert_eq!(after.version, before.version + 1);
    }

    #[tokio::test]
    async fn test_guard_rejects_negative_result() {
        let book = book();
        book.adjust(&unit(), PoolKind::Cash, Balance::new(dec!(100)), Guard::None)
            .await
            .unwrap();

        let result = book
            .adjust(&unit(), PoolKind::Cash, Balance::new(dec!(-150)), Guard::NonNegative)
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(
            book.read(&unit(), PoolKind::Cash).await.unwrap(),
            Balance::new(dec!(100))
        );

        // without the guard the pool may go negative
        let balance = book
            .adjust(&unit(), PoolKind::Cash, Balance::new(dec!(-150)), Guard::None)
            .await
            .unwrap();
        assert_eq!(balance, Balance::new(dec!(-50)));
    }

    #[tokio::test]
    async fn test_pools_are_independent() {
        let book = book();
        book.adjust(&unit(), PoolKind::Virtual, Balance::new(dec!(70)), Guard::None)
            .await
            .unwrap();
        assert_eq!(book.read(&unit(), PoolKind::Cash).await.unwrap(), Balance::ZERO);

        let other = BusinessUnitId::new("other").unwrap();
        assert_eq!(book.read(&other, PoolKind::Virtual).await.unwrap(), Balance::ZERO);
    }
}
