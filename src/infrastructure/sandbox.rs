//! In-process stand-in for the payment gateway.
//!
//! Used when no gateway is configured and by the test suite. The operator (or a
//! test) plays the gateway side: it decides the status of each reference and can
//! make calls fail or stall.

use crate::domain::intent::{ExternalReference, GatewayStatus, RedirectPayload};
use crate::domain::ports::{GatewayPayment, PaymentGateway, PreferenceRequest};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct SandboxState {
    preferences: Vec<PreferenceRequest>,
    statuses: HashMap<ExternalReference, GatewayStatus>,
    payments: HashMap<String, GatewayPayment>,
    failures_left: u32,
    latency: Duration,
}

#[derive(Default, Clone)]
pub struct SandboxGateway {
    state: Arc<RwLock<SandboxState>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what the gateway reports for `reference`, and registers a payment
    /// event `pay-{reference}` carrying that status.
    pub async fn set_status(&self, reference: &ExternalReference, status: GatewayStatus) {
        let mut state = self.state.write().await;
        state.statuses.insert(reference.clone(), status);
        let payment_id = format!("pay-{reference}");
        state.payments.insert(
            payment_id.clone(),
            GatewayPayment {
                payment_id,
                reference: reference.clone(),
                status,
            },
        );
    }

    /// Makes the next `n` calls fail as if the gateway were unreachable.
    pub async fn fail_next(&self, n: u32) {
        self.state.write().await.failures_left = n;
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    pub async fn preference_count(&self) -> usize {
        self.state.read().await.preferences.len()
    }

    async fn call(&self) -> Result<()> {
        let latency = self.state.read().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.write().await;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(LedgerError::GatewayUnavailable(
                "sandbox: injected failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<RedirectPayload> {
        self.call().await?;
        let mut state = self.state.write().await;
        state.preferences.push(request.clone());
        let preference_id = format!("sandbox-pref-{}", state.preferences.len());
        Ok(RedirectPayload {
            checkout_url: format!(
                "https://sandbox.invalid/checkout/{preference_id}?ref={}",
                request.reference
            ),
            preference_id,
        })
    }

    async fn fetch_status(&self, reference: &ExternalReference) -> Result<Option<GatewayStatus>> {
        self.call().await?;
        Ok(self.state.read().await.statuses.get(reference).copied())
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>> {
        self.call().await?;
        Ok(self.state.read().await.payments.get(payment_id).cloned())
    }
}
