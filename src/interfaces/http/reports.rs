use super::{ApiResult, AppState, unit};
use crate::application::reports::{BalanceSummary, Period, SalesReport};
use crate::domain::anomaly::Anomaly;
use crate::domain::intent::PaymentIntent;
use crate::domain::ledger::LedgerEntry;
use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

pub async fn balances(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
) -> ApiResult<Json<BalanceSummary>> {
    let summary = state.engine.reports().current_balances(&unit(&raw_unit)?).await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct SalesQuery {
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    from: Option<NaiveDate>,
    #[serde(default)]
    to: Option<NaiveDate>,
}

pub async fn sales(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
    Query(query): Query<SalesQuery>,
) -> ApiResult<Json<SalesReport>> {
    let period = Period::parse(
        query.period.as_deref().unwrap_or("today"),
        query.from,
        query.to,
    )?;
    let report = state
        .engine
        .reports()
        .sales_by_period(&unit(&raw_unit)?, period, Utc::now())
        .await?;
    Ok(Json(report))
}

pub async fn ledger(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
) -> ApiResult<Json<Vec<LedgerEntry>>> {
    Ok(Json(state.engine.reports().ledger(&unit(&raw_unit)?).await?))
}

pub async fn intents(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
) -> ApiResult<Json<Vec<PaymentIntent>>> {
    Ok(Json(state.engine.reports().intents(&unit(&raw_unit)?).await?))
}

pub async fn anomalies(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
) -> ApiResult<Json<Vec<Anomaly>>> {
    Ok(Json(state.engine.reports().anomalies(&unit(&raw_unit)?).await?))
}
