#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tillbook::application::confirmation::SettlementPolicy;
use tillbook::application::engine::{Backends, EngineOptions, LedgerEngine};
use tillbook::application::gateway::{CreateIntent, CreatedIntent};
use tillbook::domain::money::Balance;
use tillbook::domain::order::{LineItem, OrderRef, OrderSnapshot};
use tillbook::domain::pool::{BalancePool, BusinessUnitId, PoolKind};
use tillbook::infrastructure::in_memory::{
    InMemoryAnomalyLog, InMemoryIntentStore, InMemoryLedgerStore, InMemoryOrderBook,
};
use tillbook::infrastructure::sandbox::SandboxGateway;

/// An engine over in-memory backends, with handles to play the outside world.
pub struct Harness {
    pub engine: Arc<LedgerEngine>,
    pub ledger: InMemoryLedgerStore,
    pub intents: InMemoryIntentStore,
    pub anomalies: InMemoryAnomalyLog,
    pub orders: InMemoryOrderBook,
    pub gateway: SandboxGateway,
}

pub fn harness() -> Harness {
    let ledger = InMemoryLedgerStore::new();
    let intents = InMemoryIntentStore::new();
    let anomalies = InMemoryAnomalyLog::new();
    let orders = InMemoryOrderBook::new();
    let gateway = SandboxGateway::new();

    let engine = LedgerEngine::new(
        Backends {
            ledger: Arc::new(ledger.clone()),
            intents: Arc::new(intents.clone()),
            anomalies: Arc::new(anomalies.clone()),
            orders: Arc::new(orders.clone()),
            gateway: Arc::new(gateway.clone()),
        },
        EngineOptions {
            commit_attempts: 64,
            settlement: SettlementPolicy {
                attempts: 3,
                backoff: Duration::from_millis(1),
            },
            ..EngineOptions::default()
        },
    );

    Harness {
        engine: Arc::new(engine),
        ledger,
        intents,
        anomalies,
        orders,
        gateway,
    }
}

pub fn unit() -> BusinessUnitId {
    BusinessUnitId::new("resto").unwrap()
}

impl Harness {
    /// Opens `kind` with `amount` already in it.
    pub async fn open_pool(&self, kind: PoolKind, amount: Decimal) {
        self.ledger
            .seed_pool(BalancePool::opened(
                unit(),
                kind,
                Balance::new(amount),
                chrono::Utc::now(),
            ))
            .await;
        self.engine.ensure_pools(&unit()).await.unwrap();
    }

    /// Seats a table with a single line item worth `amount`.
    pub async fn seat(&self, table: &str, amount: Decimal) -> OrderRef {
        let order = OrderRef::table(table).unwrap();
        self.orders
            .put(OrderSnapshot::occupied(
                order.clone(),
                vec![LineItem {
                    name: "Menu del dia".into(),
                    quantity: 1,
                    unit_price: amount,
                }],
            ))
            .await;
        order
    }

    pub async fn checkout(&self, order: &OrderRef, amount: Decimal) -> CreatedIntent {
        self.engine
            .create_intent(CreateIntent {
                business_unit: unit(),
                order_ref: order.clone(),
                amount,
                description: format!("Mesa {}", order.id()),
                pool: Some(PoolKind::Cash),
                idempotency_key: None,
            })
            .await
            .unwrap()
    }

    pub async fn cash(&self) -> Decimal {
        self.engine
            .balances()
            .read(&unit(), PoolKind::Cash)
            .await
            .unwrap()
            .value()
    }
}
