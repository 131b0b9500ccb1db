use super::balances::{BalanceBook, Guard};
use crate::domain::ledger::{EntryId, EntryKind, LedgerEntry, NewEntry};
use crate::domain::money::{Amount, Balance};
use crate::domain::pool::{BusinessUnitId, PoolKind};
use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recorded {
    pub entry: LedgerEntry,
    /// Pool balance right after the entry was applied.
    pub balance: Balance,
    /// The entry had already been recorded under the same id.
    pub duplicate: bool,
}

/// Appends ledger entries together with the pool adjustment they imply.
///
/// The entry and the balance change go through a single store commit, so one is
/// never visible without the other. Outgoing kinds are checked against the pool
/// balance read inside that commit, which closes the gap between a caller's
/// pre-check and the write.
pub struct TransactionRecorder {
    book: Arc<BalanceBook>,
}

impl TransactionRecorder {
    pub fn new(book: Arc<BalanceBook>) -> Self {
        Self { book }
    }

    pub async fn record(&self, unit: &BusinessUnitId, new: NewEntry) -> Result<Recorded> {
        let amount = Amount::new(new.amount)?;
        if new.created_by.trim().is_empty() {
            return Err(LedgerError::Validation("created_by is required".to_string()));
        }

        let entry = LedgerEntry {
            id: new.id.unwrap_or_else(EntryId::generate),
            business_unit: unit.clone(),
            kind: new.kind,
            amount,
            pool: new.pool,
            timestamp: None,
            note: new.note.filter(|n| !n.trim().is_empty()),
            counterparty: new.counterparty.filter(|c| !c.trim().is_empty()),
            created_by: new.created_by,
            sale: new.sale,
        };
        let guard = if entry.kind.requires_funds() {
            Guard::NonNegative
        } else {
            Guard::None
        };

        let applied = self
            .book
            .apply(unit, entry.pool, entry.delta(), guard, Some(entry.clone()))
            .await
            .inspect_err(|err| {
                if matches!(err, LedgerError::InsufficientFunds { .. }) {
                    tracing::info!(
                        business_unit = %unit,
                        pool = %entry.pool,
                        kind = %entry.kind,
                        amount = %entry.amount,
                        "entry rejected: insufficient funds"
                    );
                }
            })?;

        let entry = applied.entry.unwrap_or(entry);
        if applied.duplicate {
            tracing::info!(business_unit = %unit, entry = %entry.id, "entry already recorded");
        } else {
            tracing::info!(
                business_unit = %unit,
                entry = %entry.id,
                kind = %entry.kind,
                pool = %entry.pool,
                amount = %entry.amount,
                balance = %applied.balance,
                "ledger entry recorded"
            );
        }
        Ok(Recorded {
            entry,
            balance: applied.balance,
            duplicate: applied.duplicate,
        })
    }

    /// Caller-side check that `amount` can leave the pool right now.
    ///
    /// Only the pool's own balance counts. `record` repeats the check at commit time.
    pub async fn ensure_sufficient(
        &self,
        unit: &BusinessUnitId,
        pool: PoolKind,
        amount: Amount,
    ) -> Result<()> {
        let available = self.book.read(unit, pool).await?;
        if available < Balance::from(amount) {
            return Err(LedgerError::InsufficientFunds {
                pool,
                available: available.value(),
                requested: amount.value(),
            });
        }
        Ok(())
    }

    /// Zeroes a pool, recording the removed amount as a `BalanceReset` entry.
    ///
    /// Returns `None` when the pool is already empty.
    pub async fn reset_pool(
        &self,
        unit: &BusinessUnitId,
        pool: PoolKind,
        created_by: &str,
        motive: Option<String>,
    ) -> Result<Option<Recorded>> {
        loop {
            let current = self.book.pool(unit, pool).await?;
            if current.amount.value() <= rust_decimal::Decimal::ZERO {
                tracing::info!(business_unit = %unit, pool = %pool, "reset skipped: pool is empty");
                return Ok(None);
            }

            let mut new = NewEntry::new(
                EntryKind::BalanceReset,
                current.amount.value(),
                pool,
                created_by,
            );
            new.note = motive.clone();
            // An outgoing entry that raced this one makes the reset overshoot; the
            // guard rejects it and the next round sees the smaller balance.
            let recorded = match self.record(unit, new).await {
                Ok(recorded) => recorded,
                Err(LedgerError::InsufficientFunds { .. }) => continue,
                Err(err) => return Err(err),
            };

            if recorded.balance == Balance::ZERO {
                tracing::warn!(
                    business_unit = %unit,
                    pool = %pool,
                    removed = %recorded.entry.amount,
                    "balance pool reset"
                );
                return Ok(Some(recorded));
            }
            // Income landed in between; reset what is left.
        }
    }
}
