use super::gateway::GatewayAdapter;
use super::recorder::TransactionRecorder;
use super::release::OrderReleaseCoordinator;
use crate::domain::anomaly::{Anomaly, AnomalyKind};
use crate::domain::intent::{
    ExternalReference, GatewayStatus, IntentStatus, PaymentIntent, ReleaseState, Settlement,
    Transition,
};
use crate::domain::ledger::{EntryId, EntryKind, NewEntry, SaleLink};
use crate::domain::ports::{AnomalyLogRef, IntentStoreRef};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A gateway notification, pushed by webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Names the reference and a claimed status. The claim is only a hint:
    /// the status actually applied is re-read from the gateway.
    Status {
        reference: ExternalReference,
        status: GatewayStatus,
    },
    /// Only names a gateway payment; its reference and status must be fetched.
    PaymentEvent { payment_id: String },
    /// A topic the ledger doesn't care about.
    Other { topic: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// The intent moved to a new status.
    Applied,
    /// The intent already had this status.
    Duplicate,
    /// The notification was older than the intent's status.
    Stale,
    /// The gateway has no payment for the reference yet.
    NoPayment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub reference: ExternalReference,
    pub status: IntentStatus,
    pub outcome: ConfirmOutcome,
    pub settlement: Settlement,
}

#[derive(Debug, Clone, Copy)]
pub struct SettlementPolicy {
    pub attempts: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Single entry point for payment confirmations, pushed or polled.
///
/// The status change is persisted (compare-and-swap on the intent) before any
/// side effect runs, so the first approval wins and later deliveries only
/// re-drive whatever settlement step is still outstanding. Once approved, an
/// intent is never moved back, whatever happens to its side effects.
pub struct ConfirmationProcessor {
    intents: IntentStoreRef,
    anomalies: AnomalyLogRef,
    adapter: Arc<GatewayAdapter>,
    recorder: Arc<TransactionRecorder>,
    releaser: Arc<OrderReleaseCoordinator>,
    policy: SettlementPolicy,
}

impl ConfirmationProcessor {
    pub fn new(
        intents: IntentStoreRef,
        anomalies: AnomalyLogRef,
        adapter: Arc<GatewayAdapter>,
        recorder: Arc<TransactionRecorder>,
        releaser: Arc<OrderReleaseCoordinator>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            intents,
            anomalies,
            adapter,
            recorder,
            releaser,
            policy,
        }
    }

    pub async fn confirm(
        &self,
        reference: &ExternalReference,
        status: IntentStatus,
    ) -> Result<Confirmation> {
        loop {
            let Some(intent) = self.intents.get(reference).await? else {
                tracing::warn!(reference = %reference, %status, "notification for unknown reference");
                self.anomaly(reference, AnomalyKind::UnknownReference).await;
                return Err(LedgerError::IntentNotFound(reference.to_string()));
            };

            match intent.status.transition_to(status) {
                Transition::Advance(next) => {
                    let version = intent.version;
                    let mut updated = intent.clone();
                    updated.status = next;
                    updated.updated_at = Utc::now();
                    if !self.intents.replace(version, updated.clone()).await? {
                        tracing::debug!(reference = %reference, "intent changed concurrently, re-evaluating");
                        continue;
                    }
                    updated.version = version + 1;
                    tracing::info!(
                        reference = %reference,
                        from = %intent.status,
                        to = %next,
                        "payment intent status advanced"
                    );

                    let settlement = if updated.needs_settlement() {
                        self.settle(updated).await?
                    } else {
                        updated.settlement
                    };
                    return Ok(Confirmation {
                        reference: reference.clone(),
                        status: next,
                        outcome: ConfirmOutcome::Applied,
                        settlement,
                    });
                }
                Transition::Unchanged | Transition::Stale => {
                    let outcome = if intent.status == status {
                        tracing::info!(reference = %reference, %status, "duplicate notification");
                        ConfirmOutcome::Duplicate
                    } else {
                        tracing::info!(
                            reference = %reference,
                            current = %intent.status,
                            received = %status,
                            "stale notification ignored"
                        );
                        ConfirmOutcome::Stale
                    };
                    return self.with_pending_settlement(intent, outcome).await;
                }
                Transition::Conflict { current, attempted } => {
                    tracing::warn!(
                        reference = %reference,
                        %current,
                        %attempted,
                        "conflicting confirmation, keeping first terminal status"
                    );
                    self.anomaly(
                        reference,
                        AnomalyKind::ConflictingConfirmation { current, attempted },
                    )
                    .await;
                    return Err(LedgerError::ConflictingConfirmation {
                        reference: reference.to_string(),
                        current,
                        attempted,
                    });
                }
            }
        }
    }

    /// Pull path: asks the gateway for the status of `reference` and confirms it.
    pub async fn check(&self, reference: &ExternalReference) -> Result<Confirmation> {
        let intent = self.adapter.intent(reference).await?;
        match self.adapter.query_status(reference).await? {
            Some(status) => self.confirm(reference, status.into()).await,
            None => self.with_pending_settlement(intent, ConfirmOutcome::NoPayment).await,
        }
    }

    /// Push path. Returns `None` for notifications that don't concern an intent.
    pub async fn handle_notification(
        &self,
        notification: Notification,
    ) -> Result<Option<Confirmation>> {
        match notification {
            Notification::Status { reference, status: claimed } => {
                let Some(intent) = self.intents.get(&reference).await? else {
                    tracing::warn!(reference = %reference, claimed = ?claimed, "notification for unknown reference");
                    self.anomaly(&reference, AnomalyKind::UnknownReference).await;
                    return Err(LedgerError::IntentNotFound(reference.to_string()));
                };
                // the pushed status is unauthenticated; only the gateway's answer counts
                let reported = self.adapter.query_status(&reference).await?;
                if reported != Some(claimed) {
                    tracing::warn!(
                        reference = %reference,
                        claimed = ?claimed,
                        reported = ?reported,
                        "notified status differs from the gateway's"
                    );
                }
                match reported {
                    Some(status) => self.confirm(&reference, status.into()).await.map(Some),
                    None => self
                        .with_pending_settlement(intent, ConfirmOutcome::NoPayment)
                        .await
                        .map(Some),
                }
            }
            Notification::PaymentEvent { payment_id } => {
                match self.adapter.resolve_payment(&payment_id).await? {
                    Some(payment) => self
                        .confirm(&payment.reference, payment.status.into())
                        .await
                        .map(Some),
                    None => {
                        tracing::warn!(%payment_id, "gateway does not know the notified payment");
                        Ok(None)
                    }
                }
            }
            Notification::Other { topic } => {
                tracing::debug!(%topic, "notification topic ignored");
                Ok(None)
            }
        }
    }

    async fn with_pending_settlement(
        &self,
        intent: PaymentIntent,
        outcome: ConfirmOutcome,
    ) -> Result<Confirmation> {
        let reference = intent.reference.clone();
        let status = intent.status;
        let settlement = if intent.needs_settlement() {
            tracing::info!(reference = %reference, "resuming unfinished settlement");
            self.settle(intent).await?
        } else {
            intent.settlement
        };
        Ok(Confirmation {
            reference,
            status,
            outcome,
            settlement,
        })
    }

    /// Applies the side effects of an approval: the sale income and the order
    /// release. Both are idempotent, so a step that fails is simply retried.
    async fn settle(&self, intent: PaymentIntent) -> Result<Settlement> {
        let reference = intent.reference.clone();
        let mut settlement = intent.settlement.clone();
        let mut last_failure = None;

        for attempt in 1..=self.policy.attempts.max(1) {
            settlement.attempts += 1;
            last_failure = None;

            if !settlement.income_recorded {
                match self.record_sale(&intent).await {
                    Ok(()) => settlement.income_recorded = true,
                    Err(err) => last_failure = Some(("income", err)),
                }
            }

            if settlement.release == ReleaseState::Pending {
                match self.releaser.release(&intent.order_ref, &reference).await {
                    Ok(_) => settlement.release = ReleaseState::Released,
                    Err(LedgerError::AlreadySettled { settled_by, .. }) => {
                        tracing::warn!(
                            reference = %reference,
                            order = %intent.order_ref,
                            %settled_by,
                            "order already settled by another payment"
                        );
                        self.anomaly(
                            &reference,
                            AnomalyKind::AlreadySettled {
                                order: intent.order_ref.clone(),
                                settled_by: ExternalReference::parse(&settled_by).ok(),
                            },
                        )
                        .await;
                        settlement.release = ReleaseState::NeedsReview;
                    }
                    Err(LedgerError::OrderNotFound(_)) => {
                        tracing::warn!(
                            reference = %reference,
                            order = %intent.order_ref,
                            "paid order no longer exists"
                        );
                        self.anomaly(
                            &reference,
                            AnomalyKind::OrderNotFound {
                                order: intent.order_ref.clone(),
                            },
                        )
                        .await;
                        settlement.release = ReleaseState::NeedsReview;
                    }
                    Err(err) => last_failure = Some(("release", err)),
                }
            }

            settlement = self.save_settlement(&reference, settlement).await?;
            if settlement.is_complete() {
                tracing::info!(reference = %reference, release = ?settlement.release, "payment settled");
                return Ok(settlement);
            }

            if let Some((step, err)) = &last_failure {
                tracing::warn!(reference = %reference, step, error = %err, attempt, "settlement step failed");
            }
            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        if let Some((step, err)) = last_failure {
            tracing::error!(
                reference = %reference,
                step,
                error = %err,
                "settlement still incomplete after retries"
            );
            self.anomaly(
                &reference,
                AnomalyKind::SettlementFailed {
                    step: step.to_string(),
                    error: err.to_string(),
                },
            )
            .await;
        }
        Ok(settlement)
    }

    async fn record_sale(&self, intent: &PaymentIntent) -> Result<()> {
        let mut entry = NewEntry::new(
            EntryKind::Income,
            intent.amount.value(),
            intent.pool,
            "gateway",
        )
        .with_note(intent.description.clone());
        entry.id = Some(EntryId::for_sale(&intent.reference));
        entry.sale = Some(SaleLink {
            reference: intent.reference.clone(),
            order_ref: intent.order_ref.clone(),
        });
        self.recorder.record(&intent.business_unit, entry).await?;
        Ok(())
    }

    /// Merges `progress` into the stored intent. Steps only ever go from pending
    /// to done, so merging concurrent progress can't lose a completed step.
    async fn save_settlement(
        &self,
        reference: &ExternalReference,
        progress: Settlement,
    ) -> Result<Settlement> {
        loop {
            let mut intent = self.adapter.intent(reference).await?;
            let version = intent.version;
            let stored = &intent.settlement;
            let merged = Settlement {
                income_recorded: stored.income_recorded || progress.income_recorded,
                release: match (stored.release, progress.release) {
                    (ReleaseState::Pending, other) => other,
                    (done, _) => done,
                },
                attempts: stored.attempts.max(progress.attempts),
            };
            if merged == intent.settlement {
                return Ok(merged);
            }

            let now = Utc::now();
            intent.settlement = merged.clone();
            intent.updated_at = now;
            if merged.is_complete() && intent.settled_at.is_none() {
                intent.settled_at = Some(now);
            }
            if self.intents.replace(version, intent).await? {
                return Ok(merged);
            }
        }
    }

    async fn anomaly(&self, reference: &ExternalReference, detail: AnomalyKind) {
        if let Err(err) = self.anomalies.record(Anomaly::new(reference, detail)).await {
            tracing::error!(reference = %reference, error = %err, "failed to record anomaly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::balances::BalanceBook;
    use crate::application::gateway::CreateIntent;
    use crate::domain::money::Balance;
    use crate::domain::order::{LineItem, OrderRef, OrderSnapshot, OrderState, OrderUpdate};
    use crate::domain::pool::{BusinessUnitId, PoolKind};
    use crate::domain::ports::{AnomalyLog, LedgerStore, OrderService};
    use crate::infrastructure::in_memory::{
        InMemoryAnomalyLog, InMemoryIntentStore, InMemoryLedgerStore, InMemoryOrderBook,
    };
    use crate::infrastructure::sandbox::SandboxGateway;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Order service that fails its first `failures` writes.
    struct FlakyOrders {
        inner: InMemoryOrderBook,
        failures: AtomicU32,
    }

    #[async_trait]
    impl OrderService for FlakyOrders {
        async fn get_order(&self, order: &OrderRef) -> Result<Option<OrderSnapshot>> {
            self.inner.get_order(order).await
        }

        async fn set_order_state(&self, order: &OrderRef, update: OrderUpdate) -> Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LedgerError::internal("order service unreachable"));
            }
            self.inner.set_order_state(order, update).await
        }
    }

    struct Fixture {
        processor: ConfirmationProcessor,
        adapter: Arc<GatewayAdapter>,
        gateway: SandboxGateway,
        ledger: InMemoryLedgerStore,
        orders: InMemoryOrderBook,
        anomalies: InMemoryAnomalyLog,
    }

    fn unit() -> BusinessUnitId {
        BusinessUnitId::new("resto").unwrap()
    }

    fn fixture(order_failures: u32, attempts: u32) -> Fixture {
        let gateway = SandboxGateway::new();
        let ledger = InMemoryLedgerStore::new();
        let intents = Arc::new(InMemoryIntentStore::new());
        let orders = InMemoryOrderBook::new();
        let anomalies = InMemoryAnomalyLog::new();

        let adapter = Arc::new(GatewayAdapter::new(Arc::new(gateway.clone()), intents.clone()));
        let book = Arc::new(BalanceBook::new(Arc::new(ledger.clone()), 16));
        let recorder = Arc::new(TransactionRecorder::new(book));
        let releaser = Arc::new(OrderReleaseCoordinator::new(Arc::new(FlakyOrders {
            inner: orders.clone(),
            failures: AtomicU32::new(order_failures),
        })));
        let processor = ConfirmationProcessor::new(
            intents,
            Arc::new(anomalies.clone()),
            adapter.clone(),
            recorder,
            releaser,
            SettlementPolicy {
                attempts,
                backoff: Duration::from_millis(1),
            },
        );
        Fixture {
            processor,
            adapter,
            gateway,
            ledger,
            orders,
            anomalies,
        }
    }

    async fn open_table(fx: &Fixture, table: &str) -> ExternalReference {
        let order = OrderRef::table(table).unwrap();
        fx.orders
            .put(OrderSnapshot::occupied(
                order.clone(),
                vec![LineItem {
                    name: "milanesa".into(),
                    quantity: 1,
                    unit_price: dec!(2500),
                }],
            ))
            .await;
        fx.adapter
            .create_intent(CreateIntent {
                business_unit: unit(),
                order_ref: order,
                amount: dec!(2500),
                description: format!("Mesa {table}"),
                pool: None,
                idempotency_key: None,
            })
            .await
            .unwrap()
            .external_reference
    }

    async fn cash(fx: &Fixture) -> Balance {
        fx.ledger
            .get_pool(&unit(), PoolKind::Cash)
            .await
            .unwrap()
            .map_or(Balance::ZERO, |p| p.amount)
    }

    #[tokio::test]
    async fn test_approval_records_sale_and_frees_table() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;

        let confirmation = fx
            .processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();

        assert_eq!(confirmation.outcome, ConfirmOutcome::Applied);
        assert!(confirmation.settlement.is_complete());
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));

        let entries = fx.ledger.entries(&unit()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, EntryId::for_sale(&reference));
        assert_eq!(entries[0].created_by, "gateway");

        let table = fx
            .orders
            .get_order(&OrderRef::table("4").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.state, OrderState::Free);

        let intent = fx.adapter.intent(&reference).await.unwrap();
        assert_eq!(intent.status, IntentStatus::Approved);
        assert!(intent.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_repeated_approval_is_applied_once() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;

        fx.processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();
        let again = fx
            .processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();

        assert_eq!(again.outcome, ConfirmOutcome::Duplicate);
        assert_eq!(fx.ledger.entries(&unit()).await.unwrap().len(), 1);
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));
        assert_eq!(fx.orders.updates().await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_settle_once() {
        let fx = Arc::new(fixture(0, 3));
        let reference = open_table(&fx, "9").await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let fx = fx.clone();
            let reference = reference.clone();
            handles.push(tokio::spawn(async move {
                fx.processor
                    .confirm(&reference, IntentStatus::Approved)
                    .await
                    .unwrap()
                    .outcome
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() == ConfirmOutcome::Applied {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(fx.ledger.entries(&unit()).await.unwrap().len(), 1);
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));
        assert_eq!(fx.orders.updates().await.len(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_terminal_status_is_kept_and_flagged() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;
        fx.processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();

        let result = fx.processor.confirm(&reference, IntentStatus::Rejected).await;
        assert!(matches!(
            result,
            Err(LedgerError::ConflictingConfirmation { .. })
        ));

        let intent = fx.adapter.intent(&reference).await.unwrap();
        assert_eq!(intent.status, IntentStatus::Approved);
        let anomalies = fx.anomalies.list(&unit()).await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert!(matches!(
            anomalies[0].detail,
            AnomalyKind::ConflictingConfirmation { .. }
        ));
    }

    #[tokio::test]
    async fn test_late_pending_is_stale() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;
        fx.processor
            .confirm(&reference, IntentStatus::Rejected)
            .await
            .unwrap();

        let late = fx
            .processor
            .confirm(&reference, IntentStatus::Pending)
            .await
            .unwrap();
        assert_eq!(late.outcome, ConfirmOutcome::Stale);
        assert_eq!(late.status, IntentStatus::Rejected);
        assert!(fx.ledger.entries(&unit()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reference_is_flagged() {
        let fx = fixture(0, 3);
        let reference = ExternalReference::generate(&unit());

        let result = fx.processor.confirm(&reference, IntentStatus::Approved).await;
        assert!(matches!(result, Err(LedgerError::IntentNotFound(_))));
        let anomalies = fx.anomalies.list(&unit()).await.unwrap();
        assert_eq!(anomalies[0].detail, AnomalyKind::UnknownReference);
    }

    #[tokio::test]
    async fn test_release_failure_is_retried() {
        let fx = fixture(2, 5);
        let reference = open_table(&fx, "4").await;

        let confirmation = fx
            .processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();

        assert_eq!(confirmation.settlement.release, ReleaseState::Released);
        assert_eq!(confirmation.settlement.attempts, 3);
        assert_eq!(fx.ledger.entries(&unit()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_release_is_resumed_by_next_delivery() {
        let fx = fixture(3, 2);
        let reference = open_table(&fx, "4").await;

        let first = fx
            .processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();
        assert!(first.settlement.income_recorded);
        assert_eq!(first.settlement.release, ReleaseState::Pending);
        let anomalies = fx.anomalies.list(&unit()).await.unwrap();
        assert!(matches!(
            anomalies[0].detail,
            AnomalyKind::SettlementFailed { ref step, .. } if step == "release"
        ));

        // Still approved; the next delivery finishes the job.
        let second = fx
            .processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(second.settlement.release, ReleaseState::Released);
        assert_eq!(fx.ledger.entries(&unit()).await.unwrap().len(), 1);
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));
    }

    #[tokio::test]
    async fn test_missing_order_keeps_income_and_needs_review() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;
        fx.orders.remove(&OrderRef::table("4").unwrap()).await;

        let confirmation = fx
            .processor
            .confirm(&reference, IntentStatus::Approved)
            .await
            .unwrap();

        assert_eq!(confirmation.settlement.release, ReleaseState::NeedsReview);
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));
        let anomalies = fx.anomalies.list(&unit()).await.unwrap();
        assert!(matches!(anomalies[0].detail, AnomalyKind::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_check_pulls_status_from_gateway() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;

        let nothing = fx.processor.check(&reference).await.unwrap();
        assert_eq!(nothing.outcome, ConfirmOutcome::NoPayment);
        assert_eq!(nothing.status, IntentStatus::Created);

        fx.gateway
            .set_status(&reference, GatewayStatus::Approved)
            .await;
        let checked = fx.processor.check(&reference).await.unwrap();
        assert_eq!(checked.outcome, ConfirmOutcome::Applied);
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));
    }

    #[tokio::test]
    async fn test_payment_event_is_resolved_through_gateway() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;
        fx.gateway
            .set_status(&reference, GatewayStatus::InProcess)
            .await;

        let confirmation = fx
            .processor
            .handle_notification(Notification::PaymentEvent {
                payment_id: format!("pay-{reference}"),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmation.status, IntentStatus::Pending);

        let ignored = fx
            .processor
            .handle_notification(Notification::PaymentEvent {
                payment_id: "pay-unknown".into(),
            })
            .await
            .unwrap();
        assert!(ignored.is_none());
        assert!(fx.ledger.entries(&unit()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pushed_approval_is_ignored_until_gateway_agrees() {
        let fx = fixture(0, 3);
        let reference = open_table(&fx, "4").await;

        let forged = fx
            .processor
            .handle_notification(Notification::Status {
                reference: reference.clone(),
                status: GatewayStatus::Approved,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forged.outcome, ConfirmOutcome::NoPayment);
        assert_eq!(forged.status, IntentStatus::Created);
        assert_eq!(cash(&fx).await, Balance::ZERO);
        let table = fx
            .orders
            .get_order(&OrderRef::table("4").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.state, OrderState::Occupied);

        // a claim that disagrees with the gateway applies the gateway's status
        fx.gateway
            .set_status(&reference, GatewayStatus::InProcess)
            .await;
        let pending = fx
            .processor
            .handle_notification(Notification::Status {
                reference: reference.clone(),
                status: GatewayStatus::Approved,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.status, IntentStatus::Pending);
        assert!(fx.ledger.entries(&unit()).await.unwrap().is_empty());

        fx.gateway
            .set_status(&reference, GatewayStatus::Approved)
            .await;
        let approved = fx
            .processor
            .handle_notification(Notification::Status {
                reference,
                status: GatewayStatus::Approved,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.outcome, ConfirmOutcome::Applied);
        assert_eq!(cash(&fx).await, Balance::new(dec!(2500)));
    }

    #[tokio::test]
    async fn test_pushed_status_for_unknown_reference_is_flagged() {
        let fx = fixture(0, 3);
        let reference = ExternalReference::generate(&unit());

        let result = fx
            .processor
            .handle_notification(Notification::Status {
                reference,
                status: GatewayStatus::Approved,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::IntentNotFound(_))));
        let anomalies = fx.anomalies.list(&unit()).await.unwrap();
        assert_eq!(anomalies[0].detail, AnomalyKind::UnknownReference);
    }
}
