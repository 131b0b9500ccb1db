use super::{ApiError, ApiResult, AppState, unit};
use crate::application::confirmation::{ConfirmOutcome, Confirmation, Notification};
use crate::application::gateway::{CreateIntent, CreatedIntent};
use crate::domain::intent::{ExternalReference, GatewayStatus, PaymentIntent};
use crate::domain::money::Amount;
use crate::domain::order::OrderRef;
use crate::domain::pool::PoolKind;
use crate::domain::ports::check_payment_id;
use crate::error::LedgerError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Deserialize)]
pub struct CreateIntentBody {
    order_ref: OrderRef,
    /// Decimal string.
    amount: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    pool: Option<PoolKind>,
    #[serde(default)]
    idempotency_key: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
    Json(body): Json<CreateIntentBody>,
) -> ApiResult<(StatusCode, Json<CreatedIntent>)> {
    let created = state
        .engine
        .create_intent(CreateIntent {
            business_unit: unit(&raw_unit)?,
            order_ref: body.order_ref,
            amount: Amount::parse(&body.amount)?.value(),
            description: body.description.unwrap_or_default(),
            pool: body.pool,
            idempotency_key: body.idempotency_key,
        })
        .await?;
    let status = if created.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(created)))
}

fn reference(raw: &str) -> ApiResult<ExternalReference> {
    Ok(ExternalReference::parse(raw)?)
}

pub async fn show(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<PaymentIntent>> {
    let intent = state.engine.gateway().intent(&reference(&raw)?).await?;
    Ok(Json(intent))
}

#[derive(Serialize)]
pub struct GatewayStatusView {
    reference: ExternalReference,
    gateway_status: Option<GatewayStatus>,
}

/// What the gateway says right now. Local state is left alone.
pub async fn status(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<GatewayStatusView>> {
    let reference = reference(&raw)?;
    // 404 for references we never issued
    state.engine.gateway().intent(&reference).await?;
    let gateway_status = state.engine.query_status(&reference).await?;
    Ok(Json(GatewayStatusView {
        reference,
        gateway_status,
    }))
}

pub async fn check(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<Confirmation>> {
    let confirmation = state.engine.check(&reference(&raw)?).await?;
    Ok(Json(confirmation))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookResult {
    Applied,
    Duplicate,
    Stale,
    NoPayment,
    Ignored,
    Conflict,
    UnknownReference,
}

impl From<ConfirmOutcome> for WebhookResult {
    fn from(outcome: ConfirmOutcome) -> Self {
        match outcome {
            ConfirmOutcome::Applied => WebhookResult::Applied,
            ConfirmOutcome::Duplicate => WebhookResult::Duplicate,
            ConfirmOutcome::Stale => WebhookResult::Stale,
            ConfirmOutcome::NoPayment => WebhookResult::NoPayment,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    result: WebhookResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<ExternalReference>,
}

/// Reads a notification from the body, falling back to the query string the
/// gateway uses for its event pings (`?type=payment&data.id=...`).
fn parse_notification(
    body: &Value,
    query: &HashMap<String, String>,
) -> Result<Notification, LedgerError> {
    if let (Some(raw_reference), Some(raw_status)) = (
        body.get("external_reference").and_then(Value::as_str),
        body.get("status").and_then(Value::as_str),
    ) {
        return Ok(Notification::Status {
            reference: ExternalReference::parse(raw_reference)?,
            status: raw_status.parse()?,
        });
    }

    let topic = body
        .get("type")
        .or_else(|| body.get("topic"))
        .and_then(Value::as_str)
        .or_else(|| query.get("type").or_else(|| query.get("topic")).map(String::as_str))
        .ok_or_else(|| LedgerError::Validation("notification has no type".to_string()))?;
    if topic != "payment" {
        return Ok(Notification::Other {
            topic: topic.to_string(),
        });
    }

    let payment_id = match body.pointer("/data/id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => query.get("data.id").or_else(|| query.get("id")).cloned(),
    }
    .ok_or_else(|| LedgerError::Validation("payment notification has no id".to_string()))?;
    check_payment_id(&payment_id)?;
    Ok(Notification::PaymentEvent { payment_id })
}

/// Webhook ingress. Anything the ledger has dealt with, including duplicates and
/// conflicts, is acknowledged with 200 so the gateway stops redelivering. Only
/// failures worth a redelivery answer 5xx.
pub async fn webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            LedgerError::Validation(format!("notification is not JSON: {err}"))
        })?
    };
    let notification = parse_notification(&body, &query).inspect_err(|err| {
        tracing::warn!(error = %err, "malformed gateway notification");
    })?;
    let reference = match &notification {
        Notification::Status { reference, .. } => Some(reference.clone()),
        _ => None,
    };

    let ack = match state.engine.handle_notification(notification).await {
        Ok(Some(confirmation)) => WebhookAck {
            result: confirmation.outcome.into(),
            reference: Some(confirmation.reference),
        },
        Ok(None) => WebhookAck {
            result: WebhookResult::Ignored,
            reference,
        },
        Err(LedgerError::ConflictingConfirmation { .. }) => WebhookAck {
            result: WebhookResult::Conflict,
            reference,
        },
        Err(LedgerError::IntentNotFound(_)) => WebhookAck {
            result: WebhookResult::UnknownReference,
            reference,
        },
        Err(err) => return Err(ApiError::from(err)),
    };
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_notification() {
        let body = serde_json::json!({"external_reference": "resto_abc", "status": "approved"});
        let notification = parse_notification(&body, &HashMap::new()).unwrap();
        assert!(matches!(
            notification,
            Notification::Status { status: GatewayStatus::Approved, .. }
        ));
    }

    #[test]
    fn test_parse_payment_event_from_body_or_query() {
        let body = serde_json::json!({"type": "payment", "data": {"id": 123}});
        assert_eq!(
            parse_notification(&body, &HashMap::new()).unwrap(),
            Notification::PaymentEvent {
                payment_id: "123".into()
            }
        );

        let query = HashMap::from([
            ("type".to_string(), "payment".to_string()),
            ("data.id".to_string(), "456".to_string()),
        ]);
        assert_eq!(
            parse_notification(&Value::Null, &query).unwrap(),
            Notification::PaymentEvent {
                payment_id: "456".into()
            }
        );
    }

    #[test]
    fn test_parse_other_topics_and_garbage() {
        let body = serde_json::json!({"topic": "merchant_order", "resource": "x"});
        assert!(matches!(
            parse_notification(&body, &HashMap::new()).unwrap(),
            Notification::Other { .. }
        ));
        assert!(parse_notification(&serde_json::json!({"hello": 1}), &HashMap::new()).is_err());
        let bad = serde_json::json!({"external_reference": "resto_abc", "status": "lost"});
        assert!(parse_notification(&bad, &HashMap::new()).is_err());
    }

    #[test]
    fn test_parse_rejects_payment_ids_that_are_not_plain_tokens() {
        let body = serde_json::json!({"type": "payment", "data": {"id": "1/../../checkout/preferences"}});
        assert!(matches!(
            parse_notification(&body, &HashMap::new()),
            Err(LedgerError::Validation(_))
        ));

        let query = HashMap::from([
            ("topic".to_string(), "payment".to_string()),
            ("id".to_string(), "9?access_token=x".to_string()),
        ]);
        assert!(parse_notification(&Value::Null, &query).is_err());
    }
}
