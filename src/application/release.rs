use crate::domain::intent::ExternalReference;
use crate::domain::order::{OrderRef, OrderState, OrderUpdate};
use crate::domain::ports::OrderServiceRef;
use crate::error::{LedgerError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Already released by the same payment; nothing changed.
    AlreadyReleased,
}

/// Frees a table or order once its payment is confirmed.
///
/// Releases of the same order are serialized, so the webhook and the manual poll
/// racing on one payment can't both run the state change.
pub struct OrderReleaseCoordinator {
    orders: OrderServiceRef,
    locks: Mutex<HashMap<OrderRef, Arc<tokio::sync::Mutex<()>>>>,
}

impl OrderReleaseCoordinator {
    pub fn new(orders: OrderServiceRef) -> Self {
        Self {
            orders,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn release(
        &self,
        order: &OrderRef,
        reference: &ExternalReference,
    ) -> Result<ReleaseOutcome> {
        let lock = self.lock_for(order);
        let _guard = lock.lock().await;

        let snapshot = self
            .orders
            .get_order(order)
            .await?
            .ok_or_else(|| LedgerError::OrderNotFound(order.to_string()))?;

        let same_payment = snapshot.settled_by.as_ref() == Some(reference);
        match snapshot.state {
            OrderState::Free if same_payment => {
                tracing::debug!(order = %order, reference = %reference, "order already released");
                return Ok(ReleaseOutcome::AlreadyReleased);
            }
            OrderState::Free => return Err(already_settled(order, snapshot.settled_by)),
            OrderState::Settled if !same_payment => {
                return Err(already_settled(order, snapshot.settled_by));
            }
            OrderState::Settled => {}
            OrderState::Occupied | OrderState::Served => {
                self.orders
                    .set_order_state(
                        order,
                        OrderUpdate {
                            state: OrderState::Settled,
                            clear_fields: false,
                            settled_by: Some(reference.clone()),
                        },
                    )
                    .await?;
            }
        }

        self.orders
            .set_order_state(
                order,
                OrderUpdate {
                    state: OrderState::Free,
                    clear_fields: true,
                    settled_by: Some(reference.clone()),
                },
            )
            .await?;

        tracing::info!(order = %order, reference = %reference, "order released");
        Ok(ReleaseOutcome::Released)
    }

    fn lock_for(&self, order: &OrderRef) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop locks nobody is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(order.clone()).or_default().clone()
    }
}

fn already_settled(order: &OrderRef, settled_by: Option<ExternalReference>) -> LedgerError {
    LedgerError::AlreadySettled {
        order: order.to_string(),
        settled_by: settled_by.map_or_else(|| "unknown".to_string(), |r| r.to_string()),
    }
}
