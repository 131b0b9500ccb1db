use super::balances::BalanceBook;
use super::confirmation::{Confirmation, ConfirmationProcessor, Notification, SettlementPolicy};
use super::gateway::{CreateIntent, CreatedIntent, GatewayAdapter};
use super::recorder::{Recorded, TransactionRecorder};
use super::release::OrderReleaseCoordinator;
use super::reports::Reports;
use crate::domain::intent::{ExternalReference, GatewayStatus, IntentStatus};
use crate::domain::ledger::NewEntry;
use crate::domain::pool::{BusinessUnitId, PoolKind};
use crate::domain::ports::{
    AnomalyLogRef, IntentStoreRef, LedgerStoreRef, OrderServiceRef, PaymentGatewayRef,
};
use crate::error::Result;
use chrono::{FixedOffset, Offset, Utc};
use std::sync::Arc;

/// Storage and collaborators the engine runs on.
#[derive(Clone)]
pub struct Backends {
    pub ledger: LedgerStoreRef,
    pub intents: IntentStoreRef,
    pub anomalies: AnomalyLogRef,
    pub orders: OrderServiceRef,
    pub gateway: PaymentGatewayRef,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Optimistic commit attempts per balance adjustment.
    pub commit_attempts: u32,
    pub settlement: SettlementPolicy,
    /// Local offset used to compute report periods.
    pub utc_offset: FixedOffset,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            commit_attempts: 16,
            settlement: SettlementPolicy::default(),
            utc_offset: Utc.fix(),
        }
    }
}

/// The ledger and payment-reconciliation engine.
///
/// Wires the balance book, recorder, gateway adapter, confirmation processor and
/// release coordinator over one set of backends. Cheap to share behind an `Arc`.
pub struct LedgerEngine {
    book: Arc<BalanceBook>,
    recorder: Arc<TransactionRecorder>,
    gateway: Arc<GatewayAdapter>,
    confirmations: ConfirmationProcessor,
    reports: Reports,
}

impl LedgerEngine {
    pub fn new(backends: Backends, options: EngineOptions) -> Self {
        let book = Arc::new(BalanceBook::new(
            backends.ledger.clone(),
            options.commit_attempts,
        ));
        let recorder = Arc::new(TransactionRecorder::new(book.clone()));
        let gateway = Arc::new(GatewayAdapter::new(
            backends.gateway,
            backends.intents.clone(),
        ));
        let releaser = Arc::new(OrderReleaseCoordinator::new(backends.orders));
        let confirmations = ConfirmationProcessor::new(
            backends.intents.clone(),
            backends.anomalies.clone(),
            gateway.clone(),
            recorder.clone(),
            releaser,
            options.settlement,
        );
        let reports = Reports::new(
            backends.ledger,
            backends.intents,
            backends.anomalies,
            options.utc_offset,
        );
        Self {
            book,
            recorder,
            gateway,
            confirmations,
            reports,
        }
    }

    pub fn balances(&self) -> &BalanceBook {
        &self.book
    }

    pub fn recorder(&self) -> &TransactionRecorder {
        &self.recorder
    }

    pub fn gateway(&self) -> &GatewayAdapter {
        &self.gateway
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }

    pub async fn ensure_pools(&self, unit: &BusinessUnitId) -> Result<()> {
        self.book.ensure_pools(unit).await
    }

    pub async fn record(&self, unit: &BusinessUnitId, entry: NewEntry) -> Result<Recorded> {
        self.recorder.record(unit, entry).await
    }

    pub async fn reset_pool(
        &self,
        unit: &BusinessUnitId,
        pool: PoolKind,
        created_by: &str,
        motive: Option<String>,
    ) -> Result<Option<Recorded>> {
        self.recorder.reset_pool(unit, pool, created_by, motive).await
    }

    pub async fn create_intent(&self, request: CreateIntent) -> Result<CreatedIntent> {
        self.gateway.create_intent(request).await
    }

    pub async fn query_status(&self, reference: &ExternalReference) -> Result<Option<GatewayStatus>> {
        self.gateway.query_status(reference).await
    }

    pub async fn confirm(
        &self,
        reference: &ExternalReference,
        status: IntentStatus,
    ) -> Result<Confirmation> {
        self.confirmations.confirm(reference, status).await
    }

    pub async fn check(&self, reference: &ExternalReference) -> Result<Confirmation> {
        self.confirmations.check(reference).await
    }

    pub async fn handle_notification(
        &self,
        notification: Notification,
    ) -> Result<Option<Confirmation>> {
        self.confirmations.handle_notification(notification).await
    }
}
