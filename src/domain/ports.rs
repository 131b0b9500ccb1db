use super::anomaly::Anomaly;
use super::intent::{ExternalReference, GatewayStatus, PaymentIntent, RedirectPayload};
use super::ledger::{EntryId, LedgerEntry};
use super::money::Amount;
use super::order::{OrderRef, OrderSnapshot, OrderUpdate};
use super::pool::{BalancePool, BusinessUnitId, PoolKind};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed,
    /// The pool moved on since it was read; nothing was written.
    VersionConflict,
    /// An entry with the same id exists; nothing was written.
    DuplicateEntry,
}

/// Pools and ledger entries of every business unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns `true` if the pool was created.
    async fn insert_pool_if_absent(&self, pool: BalancePool) -> Result<bool>;
    async fn get_pool(&self, unit: &BusinessUnitId, kind: PoolKind) -> Result<Option<BalancePool>>;
    async fn pools(&self, unit: &BusinessUnitId) -> Result<Vec<BalancePool>>;
    /// Atomically writes `pool` and `entry`, provided the stored pool is still at
    /// `expected_version` and no entry with the same id exists.
    async fn commit(
        &self,
        expected_version: u64,
        pool: BalancePool,
        entry: Option<LedgerEntry>,
    ) -> Result<CommitOutcome>;
    async fn entry(&self, id: &EntryId) -> Result<Option<LedgerEntry>>;
    async fn entries(&self, unit: &BusinessUnitId) -> Result<Vec<LedgerEntry>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    Existing(PaymentIntent),
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn insert_if_absent(&self, intent: PaymentIntent) -> Result<InsertOutcome>;
    async fn get(&self, reference: &ExternalReference) -> Result<Option<PaymentIntent>>;
    /// Compare-and-swap on `version`. Returns `false` if the stored intent moved on.
    async fn replace(&self, expected_version: u64, intent: PaymentIntent) -> Result<bool>;
    async fn list(&self, unit: &BusinessUnitId) -> Result<Vec<PaymentIntent>>;
}

#[async_trait]
pub trait AnomalyLog: Send + Sync {
    async fn record(&self, anomaly: Anomaly) -> Result<()>;
    async fn list(&self, unit: &BusinessUnitId) -> Result<Vec<Anomaly>>;
}

/// The order-management system.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn get_order(&self, order: &OrderRef) -> Result<Option<OrderSnapshot>>;
    async fn set_order_state(&self, order: &OrderRef, update: OrderUpdate) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceRequest {
    pub reference: ExternalReference,
    pub title: String,
    pub amount: Amount,
}

/// A payment as reported by the gateway when resolving a webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPayment {
    pub payment_id: String,
    pub reference: ExternalReference,
    pub status: GatewayStatus,
}

/// Gateway payment ids are opaque, but only ever made of ASCII letters, digits,
/// `-` and `_`. Anything else is refused before it reaches a lookup.
pub fn check_payment_id(raw: &str) -> Result<&str> {
    let valid = !raw.is_empty()
        && raw.len() <= 128
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(raw)
    } else {
        Err(LedgerError::Validation(format!("invalid payment id \"{raw}\"")))
    }
}

/// The external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<RedirectPayload>;
    /// Latest status of the payments made against `reference`, if any.
    async fn fetch_status(&self, reference: &ExternalReference) -> Result<Option<GatewayStatus>>;
    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type IntentStoreRef = Arc<dyn IntentStore>;
pub type AnomalyLogRef = Arc<dyn AnomalyLog>;
pub type OrderServiceRef = Arc<dyn OrderService>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
