use crate::domain::intent::{ExternalReference, GatewayStatus, PaymentIntent, RedirectPayload};
use crate::domain::money::Amount;
use crate::domain::order::OrderRef;
use crate::domain::pool::{BusinessUnitId, PoolKind};
use crate::domain::ports::{
    GatewayPayment, InsertOutcome, IntentStoreRef, PaymentGatewayRef, PreferenceRequest,
};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

/// Checkout request coming from the POS.
#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub business_unit: BusinessUnitId,
    pub order_ref: OrderRef,
    pub amount: Decimal,
    pub description: String,
    /// Pool credited on approval; cash unless the caller picks another method.
    pub pool: Option<PoolKind>,
    /// Caller-chosen token making retries of the same checkout idempotent.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedIntent {
    pub external_reference: ExternalReference,
    pub redirect: RedirectPayload,
    /// The intent already existed; this is the original one.
    pub duplicate: bool,
}

/// Talks to the payment gateway on behalf of the ledger.
///
/// Creates intents and reads gateway-side status. It never changes an intent's
/// status; that is left to the confirmation processor.
pub struct GatewayAdapter {
    gateway: PaymentGatewayRef,
    intents: IntentStoreRef,
}

impl GatewayAdapter {
    pub fn new(gateway: PaymentGatewayRef, intents: IntentStoreRef) -> Self {
        Self { gateway, intents }
    }

    pub async fn create_intent(&self, request: CreateIntent) -> Result<CreatedIntent> {
        let amount = Amount::new(request.amount)?;
        let reference = match request.idempotency_key.as_deref() {
            Some(key) => ExternalReference::new(&request.business_unit, key)?,
            None => ExternalReference::generate(&request.business_unit),
        };
        let description = match request.description.trim() {
            "" => format!("Order {}", request.order_ref),
            d => d.to_string(),
        };

        let intent = PaymentIntent::new(
            reference.clone(),
            request.order_ref,
            amount,
            description,
            request.pool.unwrap_or(PoolKind::Cash),
            Utc::now(),
        );

        let (intent, duplicate) = match self.intents.insert_if_absent(intent.clone()).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    business_unit = %intent.business_unit,
                    reference = %reference,
                    order = %intent.order_ref,
                    amount = %intent.amount,
                    "payment intent created"
                );
                (intent, false)
            }
            InsertOutcome::Existing(existing) => {
                if existing.amount != intent.amount
                    || existing.order_ref != intent.order_ref
                    || existing.pool != intent.pool
                {
                    return Err(LedgerError::Validation(format!(
                        "idempotency key of {reference} was used for a different checkout"
                    )));
                }
                tracing::info!(reference = %reference, "payment intent already exists");
                if let Some(redirect) = existing.redirect.clone() {
                    return Ok(CreatedIntent {
                        external_reference: reference,
                        redirect,
                        duplicate: true,
                    });
                }
                // An earlier attempt did not get a redirect yet; ask again.
                (existing, true)
            }
        };

        // No lock or transaction is held across the gateway call.
        let redirect = self
            .gateway
            .create_preference(&PreferenceRequest {
                reference: reference.clone(),
                title: intent.description.clone(),
                amount: intent.amount,
            })
            .await
            .inspect_err(|err| {
                tracing::warn!(reference = %reference, error = %err, "preference creation failed");
            })?;

        let redirect = self.attach_redirect(&reference, redirect).await?;
        Ok(CreatedIntent {
            external_reference: reference,
            redirect,
            duplicate,
        })
    }

    /// Gateway-side status of `reference`. Does not touch local state.
    pub async fn query_status(&self, reference: &ExternalReference) -> Result<Option<GatewayStatus>> {
        let status = self.gateway.fetch_status(reference).await?;
        tracing::debug!(reference = %reference, status = ?status, "gateway status queried");
        Ok(status)
    }

    /// Resolves a gateway payment event to the reference and status it carries.
    pub async fn resolve_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>> {
        self.gateway.fetch_payment(payment_id).await
    }

    pub async fn intent(&self, reference: &ExternalReference) -> Result<PaymentIntent> {
        self.intents
            .get(reference)
            .await?
            .ok_or_else(|| LedgerError::IntentNotFound(reference.to_string()))
    }

    /// Stores the redirect unless a concurrent call already stored one, in which
    /// case that one wins.
    async fn attach_redirect(
        &self,
        reference: &ExternalReference,
        redirect: RedirectPayload,
    ) -> Result<RedirectPayload> {
        loop {
            let mut intent = self.intent(reference).await?;
            if let Some(existing) = intent.redirect {
                return Ok(existing);
            }
            let version = intent.version;
            intent.redirect = Some(redirect.clone());
            intent.updated_at = Utc::now();
            if self.intents.replace(version, intent).await? {
                return Ok(redirect);
            }
        }
    }
}
