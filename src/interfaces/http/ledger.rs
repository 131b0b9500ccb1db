use super::{ApiResult, AppState, unit};
use crate::application::recorder::Recorded;
use crate::domain::ledger::{EntryKind, NewEntry};
use crate::domain::money::Amount;
use crate::domain::pool::PoolKind;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Body of every manual ledger entry. Amounts are decimal strings.
#[derive(Deserialize)]
pub struct EntryBody {
    amount: String,
    /// Pool the money enters or leaves; cash when omitted.
    #[serde(default)]
    pool: Option<PoolKind>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    counterparty: Option<String>,
    created_by: String,
}

async fn record(
    state: AppState,
    raw_unit: String,
    kind: EntryKind,
    body: EntryBody,
) -> ApiResult<(StatusCode, Json<Recorded>)> {
    let unit = unit(&raw_unit)?;
    let amount = Amount::parse(&body.amount)?;
    let pool = body.pool.unwrap_or(PoolKind::Cash);
    if kind.requires_funds() {
        state.engine.recorder().ensure_sufficient(&unit, pool, amount).await?;
    }

    let mut entry = NewEntry::new(kind, amount.value(), pool, body.created_by);
    entry.note = body.note;
    entry.counterparty = body.counterparty;
    let recorded = state.engine.record(&unit, entry).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn income(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
    Json(body): Json<EntryBody>,
) -> ApiResult<(StatusCode, Json<Recorded>)> {
    record(state, raw_unit, EntryKind::Income, body).await
}

pub async fn withdrawal(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
    Json(body): Json<EntryBody>,
) -> ApiResult<(StatusCode, Json<Recorded>)> {
    record(state, raw_unit, EntryKind::Withdrawal, body).await
}

pub async fn supplier_payment(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
    Json(body): Json<EntryBody>,
) -> ApiResult<(StatusCode, Json<Recorded>)> {
    record(state, raw_unit, EntryKind::SupplierPayment, body).await
}

pub async fn payroll_payment(
    State(state): State<AppState>,
    Path(raw_unit): Path<String>,
    Json(body): Json<EntryBody>,
) -> ApiResult<(StatusCode, Json<Recorded>)> {
    record(state, raw_unit, EntryKind::PayrollPayment, body).await
}

#[derive(Deserialize)]
pub struct ResetBody {
    created_by: String,
    #[serde(default)]
    motive: Option<String>,
}

#[derive(Serialize)]
pub struct ResetView {
    /// `None` when the pool was already empty.
    recorded: Option<Recorded>,
}

pub async fn reset(
    State(state): State<AppState>,
    Path((raw_unit, raw_pool)): Path<(String, String)>,
    Json(body): Json<ResetBody>,
) -> ApiResult<Json<ResetView>> {
    let unit = unit(&raw_unit)?;
    let pool: PoolKind = raw_pool.parse()?;
    let recorded = state
        .engine
        .reset_pool(&unit, pool, &body.created_by, body.motive)
        .await?;
    Ok(Json(ResetView { recorded }))
}
