//! REST client for the hosted payment gateway.
//!
//! Speaks the checkout-preference / payment-search dialect: a preference is
//! created per intent and carries our external reference, and payments made
//! against it are looked up by that reference or by the payment id a webhook
//! names.

use crate::domain::intent::{ExternalReference, GatewayStatus, RedirectPayload};
use crate::domain::ports::{GatewayPayment, PaymentGateway, PreferenceRequest, check_payment_id};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub access_token: String,
    /// Where the gateway should push payment notifications.
    pub notification_url: Option<String>,
    pub currency: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct PreferenceItem<'a> {
    title: &'a str,
    quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    unit_price: Decimal,
    currency_id: &'a str,
}

#[derive(Serialize)]
struct PreferenceBody<'a> {
    items: Vec<PreferenceItem<'a>>,
    external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Deserialize)]
struct PaymentBody {
    id: serde_json::Value,
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PaymentBody>,
}

pub struct HttpGateway {
    client: Client,
    config: HttpGatewayConfig,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(LedgerError::Validation(
                "gateway base_url is empty".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LedgerError::internal)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|err| LedgerError::GatewayUnavailable(err.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::GatewayUnavailable(format!(
                "gateway answered {status}"
            )));
        }
        Ok(response)
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::internal(format!(
                "gateway rejected the request ({status}): {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|err| LedgerError::GatewayUnavailable(format!("unreadable response: {err}")))
    }
}

fn parse_status(raw: &str) -> Result<GatewayStatus> {
    raw.parse()
        .map_err(|_| LedgerError::internal(format!("gateway sent unknown status \"{raw}\"")))
}

fn payment_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<RedirectPayload> {
        let body = PreferenceBody {
            items: vec![PreferenceItem {
                title: &request.title,
                quantity: 1,
                unit_price: request.amount.value(),
                currency_id: &self.config.currency,
            }],
            external_reference: request.reference.to_string(),
            notification_url: self.config.notification_url.as_deref(),
        };
        let response = self
            .send(self.client.post(self.url("/checkout/preferences")).json(&body))
            .await?;
        let preference: PreferenceResponse = Self::json(response).await?;
        tracing::debug!(reference = %request.reference, preference = %preference.id, "preference created");
        Ok(RedirectPayload {
            preference_id: preference.id,
            checkout_url: preference.init_point,
        })
    }

    /// An approved payment wins over any other attempt against the same
    /// reference; otherwise the most recent one counts.
    async fn fetch_status(&self, reference: &ExternalReference) -> Result<Option<GatewayStatus>> {
        let response = self
            .send(
                self.client
                    .get(self.url("/v1/payments/search"))
                    .query(&[
                        ("external_reference", reference.to_string().as_str()),
                        ("sort", "date_created"),
                        ("criteria", "desc"),
                    ]),
            )
            .await?;
        let search: SearchResponse = Self::json(response).await?;

        let mut latest = None;
        for payment in &search.results {
            let status = parse_status(&payment.status)?;
            if status == GatewayStatus::Approved {
                return Ok(Some(status));
            }
            latest.get_or_insert(status);
        }
        Ok(latest)
    }

    async fn fetch_payment(&self, payment_id_raw: &str) -> Result<Option<GatewayPayment>> {
        let payment_id_raw = check_payment_id(payment_id_raw)?;
        let response = self
            .send(self.client.get(self.url(&format!("/v1/payments/{payment_id_raw}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payment: PaymentBody = Self::json(response).await?;

        let Some(reference) = payment
            .external_reference
            .as_deref()
            .and_then(|raw| ExternalReference::parse(raw).ok())
        else {
            tracing::warn!(payment_id = payment_id_raw, "payment carries no usable external reference");
            return Ok(None);
        };
        Ok(Some(GatewayPayment {
            payment_id: payment_id(&payment.id),
            reference,
            status: parse_status(&payment.status)?,
        }))
    }
}
