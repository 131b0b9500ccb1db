use crate::domain::anomaly::Anomaly;
use crate::domain::intent::{ExternalReference, PaymentIntent};
use crate::domain::ledger::{EntryId, LedgerEntry};
use crate::domain::pool::{BalancePool, BusinessUnitId, PoolKind};
use crate::domain::ports::{AnomalyLog, CommitOutcome, InsertOutcome, IntentStore, LedgerStore};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode,
    OptimisticTransactionDB, Options,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column family for balance pools, keyed `{unit}/{kind}`.
pub const CF_POOLS: &str = "pools";
/// Column family for ledger entries (`e/{id}`) and their per-unit index
/// (`u/{unit}/{micros}/{id}`).
pub const CF_LEDGER: &str = "ledger";
/// Column family for payment intents, keyed by external reference.
pub const CF_INTENTS: &str = "intents";
/// Column family for anomalies, keyed `{unit}/{id}`.
pub const CF_ANOMALIES: &str = "anomalies";

impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::Internal(Box::new(err))
    }
}

/// A persistent store backed by a RocksDB optimistic-transaction database.
///
/// Every conditional write (pool commit, intent compare-and-swap) reads its keys
/// with `get_for_update` inside one transaction. If another writer touched them
/// first, the commit fails with `Busy` and the write is reported as a conflict
/// so the caller retries from a fresh read.
///
/// `Clone` shares the underlying database handle.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<OptimisticTransactionDB>,
}

impl RocksDbStore {
    /// Opens or creates the database at `path` with all column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_POOLS, CF_LEDGER, CF_INTENTS, CF_ANOMALIES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = OptimisticTransactionDB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::internal(format!("column family {name} not found"))
        })
    }

    fn read_json<T: DeserializeOwned>(&self, family: &str, key: &str) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(family)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Values of every key starting with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, family: &str, prefix: &str) -> Result<Vec<T>> {
        let mut found = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf(family)?,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            found.push(serde_json::from_slice(&value)?);
        }
        Ok(found)
    }

    fn scan_keys(&self, family: &str, prefix: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf(family)?,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            found.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(found)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn entry_key(id: &EntryId) -> String {
    format!("e/{id}")
}

fn unit_index_prefix(unit: &BusinessUnitId) -> String {
    format!("u/{unit}/")
}

fn unit_index_key(entry: &LedgerEntry) -> String {
    let micros = entry.timestamp.map_or(0, |ts| ts.timestamp_micros().max(0));
    format!("{}{micros:020}/{}", unit_index_prefix(&entry.business_unit), entry.id)
}

/// Outcome of committing an optimistic transaction.
fn committed(result: std::result::Result<(), rocksdb::Error>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if matches!(err.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl LedgerStore for RocksDbStore {
    async fn insert_pool_if_absent(&self, pool: BalancePool) -> Result<bool> {
        let cf = self.cf(CF_POOLS)?;
        let key = BalancePool::key(&pool.business_unit, pool.kind);
        loop {
            let txn = self.db.transaction();
            if txn.get_for_update_cf(cf, &key, true)?.is_some() {
                return Ok(false);
            }
            txn.put_cf(cf, &key, encode(&pool)?)?;
            if committed(txn.commit())? {
                return Ok(true);
            }
        }
    }

    async fn get_pool(&self, unit: &BusinessUnitId, kind: PoolKind) -> Result<Option<BalancePool>> {
        self.read_json(CF_POOLS, &BalancePool::key(unit, kind))
    }

    async fn pools(&self, unit: &BusinessUnitId) -> Result<Vec<BalancePool>> {
        let mut pools = Vec::new();
        for kind in PoolKind::ALL {
            if let Some(pool) = self.get_pool(unit, kind).await? {
                pools.push(pool);
            }
        }
        Ok(pools)
    }

    async fn commit(
        &self,
        expected_version: u64,
        pool: BalancePool,
        entry: Option<LedgerEntry>,
    ) -> Result<CommitOutcome> {
        let pools = self.cf(CF_POOLS)?;
        let ledger = self.cf(CF_LEDGER)?;
        let pool_key = BalancePool::key(&pool.business_unit, pool.kind);

        let txn = self.db.transaction();
        if let Some(entry) = &entry
            && txn
                .get_for_update_cf(ledger, entry_key(&entry.id), true)?
                .is_some()
        {
            return Ok(CommitOutcome::DuplicateEntry);
        }
        let current: Option<BalancePool> = txn
            .get_for_update_cf(pools, &pool_key, true)?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?;
        if current.map(|p| p.version) != Some(expected_version) {
            return Ok(CommitOutcome::VersionConflict);
        }

        txn.put_cf(pools, &pool_key, encode(&pool)?)?;
        if let Some(entry) = &entry {
            txn.put_cf(ledger, entry_key(&entry.id), encode(entry)?)?;
            txn.put_cf(ledger, unit_index_key(entry), entry.id.as_str())?;
        }
        if committed(txn.commit())? {
            Ok(CommitOutcome::Committed)
        } else {
            tracing::debug!(pool = %pool_key, "rocksdb commit lost a write race");
            Ok(CommitOutcome::VersionConflict)
        }
    }

    async fn entry(&self, id: &EntryId) -> Result<Option<LedgerEntry>> {
        self.read_json(CF_LEDGER, &entry_key(id))
    }

    async fn entries(&self, unit: &BusinessUnitId) -> Result<Vec<LedgerEntry>> {
        let prefix = unit_index_prefix(unit);
        let mut entries = Vec::new();
        for key in self.scan_keys(CF_LEDGER, &prefix)? {
            let Some((_, id)) = key.rsplit_once('/') else {
                continue;
            };
            if let Some(entry) = self.read_json(CF_LEDGER, &format!("e/{id}"))? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl IntentStore for RocksDbStore {
    async fn insert_if_absent(&self, intent: PaymentIntent) -> Result<InsertOutcome> {
        let cf = self.cf(CF_INTENTS)?;
        let key = intent.reference.to_string();
        loop {
            let txn = self.db.transaction();
            if let Some(bytes) = txn.get_for_update_cf(cf, &key, true)? {
                return Ok(InsertOutcome::Existing(serde_json::from_slice(&bytes)?));
            }
            txn.put_cf(cf, &key, encode(&intent)?)?;
            if committed(txn.commit())? {
                return Ok(InsertOutcome::Inserted);
            }
        }
    }

    async fn get(&self, reference: &ExternalReference) -> Result<Option<PaymentIntent>> {
        self.read_json(CF_INTENTS, &reference.to_string())
    }

    async fn replace(&self, expected_version: u64, mut intent: PaymentIntent) -> Result<bool> {
        let cf = self.cf(CF_INTENTS)?;
        let key = intent.reference.to_string();

        let txn = self.db.transaction();
        let current: Option<PaymentIntent> = txn
            .get_for_update_cf(cf, &key, true)?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?;
        if current.map(|i| i.version) != Some(expected_version) {
            return Ok(false);
        }
        intent.version = expected_version + 1;
        txn.put_cf(cf, &key, encode(&intent)?)?;
        committed(txn.commit())
    }

    async fn list(&self, unit: &BusinessUnitId) -> Result<Vec<PaymentIntent>> {
        let mut intents: Vec<PaymentIntent> = self.scan(CF_INTENTS, &format!("{unit}_"))?;
        intents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(intents)
    }
}

#[async_trait]
impl AnomalyLog for RocksDbStore {
    async fn record(&self, anomaly: Anomaly) -> Result<()> {
        let key = format!("{}/{}", anomaly.business_unit, anomaly.id);
        self.db
            .put_cf(self.cf(CF_ANOMALIES)?, key, encode(&anomaly)?)?;
        Ok(())
    }

    async fn list(&self, unit: &BusinessUnitId) -> Result<Vec<Anomaly>> {
        self.scan(CF_ANOMALIES, &format!("{unit}/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anomaly::AnomalyKind;
    use crate::domain::ledger::EntryKind;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::order::OrderRef;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn unit() -> BusinessUnitId {
        BusinessUnitId::new("resto").unwrap()
    }

    fn income(amount: rust_decimal::Decimal) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::generate(),
            business_unit: unit(),
            kind: EntryKind::Income,
            amount: Amount::new(amount).unwrap(),
            pool: PoolKind::Cash,
            timestamp: Some(Utc::now()),
            note: None,
            counterparty: None,
            created_by: "test".into(),
            sale: None,
        }
    }

    #[tokio::test]
    async fn test_commit_survives_reopen() {
        let dir = tempdir().unwrap();
        let entry = income(dec!(120));
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            let pool = BalancePool::empty(unit(), PoolKind::Cash, Utc::now());
            assert!(store.insert_pool_if_absent(pool.clone()).await.unwrap());
            let next = pool.adjusted(Balance::new(dec!(120)), Utc::now());
            let outcome = store.commit(0, next, Some(entry.clone())).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed);
        }

        let store = RocksDbStore::open(dir.path()).unwrap();
        let pool = store.get_pool(&unit(), PoolKind::Cash).await.unwrap().unwrap();
        assert_eq!(pool.amount, Balance::new(dec!(120)));
        assert_eq!(pool.version, 1);
        assert_eq!(store.entries(&unit()).await.unwrap(), vec![entry.clone()]);
        assert_eq!(store.entry(&entry.id).await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_commit_checks_version_and_duplicates() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let pool = BalancePool::empty(unit(), PoolKind::Cash, Utc::now());
        store.insert_pool_if_absent(pool.clone()).await.unwrap();

        let entry = income(dec!(10));
        let next = pool.adjusted(Balance::new(dec!(10)), Utc::now());
        store.commit(0, next.clone(), Some(entry.clone())).await.unwrap();

        assert_eq!(
            store.commit(0, next.clone(), Some(income(dec!(10)))).await.unwrap(),
            CommitOutcome::VersionConflict
        );
        let again = next.adjusted(Balance::new(dec!(10)), Utc::now());
        assert_eq!(
            store.commit(1, again, Some(entry)).await.unwrap(),
            CommitOutcome::DuplicateEntry
        );
        assert_eq!(store.entries(&unit()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_intents_and_anomalies() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let intent = PaymentIntent::new(
            ExternalReference::generate(&unit()),
            OrderRef::table("2").unwrap(),
            Amount::new(dec!(900)).unwrap(),
            "Mesa 2".into(),
            PoolKind::Virtual,
            Utc::now(),
        );

        assert_eq!(
            store.insert_if_absent(intent.clone()).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert!(store.replace(0, intent.clone()).await.unwrap());
        assert!(!store.replace(0, intent.clone()).await.unwrap());
        assert_eq!(IntentStore::list(&store, &unit()).await.unwrap().len(), 1);

        // a unit whose name shares a prefix must not leak in
        let other = BusinessUnitId::new("resto2").unwrap();
        assert!(IntentStore::list(&store, &other).await.unwrap().is_empty());

        store
            .record(Anomaly::new(&intent.reference, AnomalyKind::UnknownReference))
            .await
            .unwrap();
        assert_eq!(AnomalyLog::list(&store, &unit()).await.unwrap().len(), 1);
        assert!(AnomalyLog::list(&store, &other).await.unwrap().is_empty());
    }
}
