use crate::domain::anomaly::Anomaly;
use crate::domain::intent::{ExternalReference, PaymentIntent};
use crate::domain::ledger::{EntryId, LedgerEntry};
use crate::domain::order::{OrderRef, OrderSnapshot, OrderState, OrderUpdate};
use crate::domain::pool::{BalancePool, BusinessUnitId, PoolKind};
use crate::domain::ports::{
    AnomalyLog, CommitOutcome, InsertOutcome, IntentStore, LedgerStore, OrderService,
};
use crate::domain::money::Balance;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    pools: HashMap<String, BalancePool>,
    entries: HashMap<EntryId, LedgerEntry>,
    /// Insertion order of `entries`.
    order: Vec<EntryId>,
}

/// A thread-safe in-memory store for pools and ledger entries.
///
/// Pools and entries share one lock so a commit writes both or neither.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a pool in place as-is, replacing any existing one.
    pub async fn seed_pool(&self, pool: BalancePool) {
        let mut state = self.state.write().await;
        state
            .pools
            .insert(BalancePool::key(&pool.business_unit, pool.kind), pool);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_pool_if_absent(&self, pool: BalancePool) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = BalancePool::key(&pool.business_unit, pool.kind);
        if state.pools.contains_key(&key) {
            return Ok(false);
        }
        state.pools.insert(key, pool);
        Ok(true)
    }

    async fn get_pool(&self, unit: &BusinessUnitId, kind: PoolKind) -> Result<Option<BalancePool>> {
        let state = self.state.read().await;
        Ok(state.pools.get(&BalancePool::key(unit, kind)).cloned())
    }

    async fn pools(&self, unit: &BusinessUnitId) -> Result<Vec<BalancePool>> {
        let state = self.state.read().await;
        let mut pools: Vec<_> = state
            .pools
            .values()
            .filter(|p| &p.business_unit == unit)
            .cloned()
            .collect();
        pools.sort_by_key(|p| p.kind);
        Ok(pools)
    }

    async fn commit(
        &self,
        expected_version: u64,
        pool: BalancePool,
        entry: Option<LedgerEntry>,
    ) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;
        let key = BalancePool::key(&pool.business_unit, pool.kind);

        if let Some(entry) = &entry
            && state.entries.contains_key(&entry.id)
        {
            return Ok(CommitOutcome::DuplicateEntry);
        }
        match state.pools.get(&key) {
            Some(current) if current.version == expected_version => {}
            _ => return Ok(CommitOutcome::VersionConflict),
        }

        state.pools.insert(key, pool);
        if let Some(entry) = entry {
            state.order.push(entry.id.clone());
            state.entries.insert(entry.id.clone(), entry);
        }
        Ok(CommitOutcome::Committed)
    }

    async fn entry(&self, id: &EntryId) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.get(id).cloned())
    }

    async fn entries(&self, unit: &BusinessUnitId) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .filter(|e| &e.business_unit == unit)
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory store for payment intents.
#[derive(Default, Clone)]
pub struct InMemoryIntentStore {
    intents: Arc<RwLock<HashMap<ExternalReference, PaymentIntent>>>,
}

impl InMemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    async fn insert_if_absent(&self, intent: PaymentIntent) -> Result<InsertOutcome> {
        let mut intents = self.intents.write().await;
        if let Some(existing) = intents.get(&intent.reference) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        intents.insert(intent.reference.clone(), intent);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, reference: &ExternalReference) -> Result<Option<PaymentIntent>> {
        let intents = self.intents.read().await;
        Ok(intents.get(reference).cloned())
    }

    async fn replace(&self, expected_version: u64, mut intent: PaymentIntent) -> Result<bool> {
        let mut intents = self.intents.write().await;
        match intents.get(&intent.reference) {
            Some(current) if current.version == expected_version => {
                intent.version = expected_version + 1;
                intents.insert(intent.reference.clone(), intent);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, unit: &BusinessUnitId) -> Result<Vec<PaymentIntent>> {
        let intents = self.intents.read().await;
        let mut found: Vec<_> = intents
            .values()
            .filter(|i| &i.business_unit == unit)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAnomalyLog {
    anomalies: Arc<RwLock<Vec<Anomaly>>>,
}

impl InMemoryAnomalyLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnomalyLog for InMemoryAnomalyLog {
    async fn record(&self, anomaly: Anomaly) -> Result<()> {
        self.anomalies.write().await.push(anomaly);
        Ok(())
    }

    async fn list(&self, unit: &BusinessUnitId) -> Result<Vec<Anomaly>> {
        let anomalies = self.anomalies.read().await;
        Ok(anomalies
            .iter()
            .filter(|a| &a.business_unit == unit)
            .cloned()
            .collect())
    }
}

/// Stand-in for the order-management system, used when none is configured.
#[derive(Default, Clone)]
pub struct InMemoryOrderBook {
    orders: Arc<RwLock<HashMap<OrderRef, OrderSnapshot>>>,
    updates: Arc<RwLock<Vec<(OrderRef, OrderUpdate)>>>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, order: OrderSnapshot) {
        self.orders
            .write()
            .await
            .insert(order.reference.clone(), order);
    }

    pub async fn remove(&self, order: &OrderRef) {
        self.orders.write().await.remove(order);
    }

    /// Every update applied so far, oldest first.
    pub async fn updates(&self) -> Vec<(OrderRef, OrderUpdate)> {
        self.updates.read().await.clone()
    }
}

#[async_trait]
impl OrderService for InMemoryOrderBook {
    async fn get_order(&self, order: &OrderRef) -> Result<Option<OrderSnapshot>> {
        Ok(self.orders.read().await.get(order).cloned())
    }

    async fn set_order_state(&self, order: &OrderRef, update: OrderUpdate) -> Result<()> {
        let mut orders = self.orders.write().await;
        let snapshot = orders
            .entry(order.clone())
            .or_insert_with(|| OrderSnapshot {
                reference: order.clone(),
                state: OrderState::Free,
                total: Balance::ZERO,
                line_items: Vec::new(),
                customer: None,
                settled_by: None,
            });
        snapshot.state = update.state;
        if update.clear_fields {
            snapshot.line_items.clear();
            snapshot.total = Balance::ZERO;
            snapshot.customer = None;
        }
        if update.settled_by.is_some() {
            snapshot.settled_by = update.settled_by.clone();
        }
        drop(orders);

        self.updates.write().await.push((order.clone(), update));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::EntryKind;
    use crate::domain::money::Amount;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn unit() -> BusinessUnitId {
        BusinessUnitId::new("resto").unwrap()
    }

    fn entry(id: &str) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::for_sale(&ExternalReference::new(&unit(), id).unwrap()),
            business_unit: unit(),
            kind: EntryKind::Income,
            amount: Amount::new(dec!(10)).unwrap(),
            pool: PoolKind::Cash,
            timestamp: Some(Utc::now()),
            note: None,
            counterparty: None,
            created_by: "test".into(),
            sale: None,
        }
    }

    #[tokio::test]
    async fn test_insert_pool_is_idempotent() {
        let store = InMemoryLedgerStore::new();
        let pool = BalancePool::empty(unit(), PoolKind::Cash, Utc::now());

        assert!(store.insert_pool_if_absent(pool.clone()).await.unwrap());
        assert!(!store.insert_pool_if_absent(pool).await.unwrap());
        assert_eq!(store.pools(&unit()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_version() {
        let store = InMemoryLedgerStore::new();
        let pool = BalancePool::empty(unit(), PoolKind::Cash, Utc::now());
        store.insert_pool_if_absent(pool.clone()).await.unwrap();

        let next = pool.adjusted(Balance::new(dec!(10)), Utc::now());
        let outcome = store.commit(0, next.clone(), Some(entry("a"))).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);

        // Same base version again: must not overwrite.
        let outcome = store.commit(0, next, Some(entry("b"))).await.unwrap();
        assert_eq!(outcome, CommitOutcome::VersionConflict);
        assert_eq!(store.entries(&unit()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_duplicate_entry() {
        let store = InMemoryLedgerStore::new();
        let pool = BalancePool::empty(unit(), PoolKind::Cash, Utc::now());
        store.insert_pool_if_absent(pool.clone()).await.unwrap();

        let first = pool.adjusted(Balance::new(dec!(10)), Utc::now());
        store.commit(0, first.clone(), Some(entry("a"))).await.unwrap();

        let second = first.adjusted(Balance::new(dec!(10)), Utc::now());
        let outcome = store.commit(1, second, Some(entry("a"))).await.unwrap();
        assert_eq!(outcome, CommitOutcome::DuplicateEntry);

        let stored = store.get_pool(&unit(), PoolKind::Cash).await.unwrap().unwrap();
        assert_eq!(stored.amount, Balance::new(dec!(10)));
    }

    #[tokio::test]
    async fn test_intent_replace_is_compare_and_swap() {
        use crate::domain::intent::IntentStatus;
        use crate::domain::order::OrderRef;

        let store = InMemoryIntentStore::new();
        let intent = PaymentIntent::new(
            ExternalReference::generate(&unit()),
            OrderRef::table("1").unwrap(),
            Amount::new(dec!(50)).unwrap(),
            "mesa 1".into(),
            PoolKind::Cash,
            Utc::now(),
        );
        store.insert_if_absent(intent.clone()).await.unwrap();
        assert!(matches!(
            store.insert_if_absent(intent.clone()).await.unwrap(),
            InsertOutcome::Existing(_)
        ));

        let mut pending = intent.clone();
        pending.status = IntentStatus::Pending;
        assert!(store.replace(0, pending.clone()).await.unwrap());
        assert!(!store.replace(0, pending).await.unwrap());

        let stored = store.get(&intent.reference).await.unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Pending);
        assert_eq!(stored.version, 1);
    }
}
