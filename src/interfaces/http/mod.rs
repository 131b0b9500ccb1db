//! JSON API over the ledger engine.

use crate::application::engine::LedgerEngine;
use crate::domain::pool::BusinessUnitId;
use crate::error::LedgerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

mod intents;
mod ledger;
mod reports;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LedgerEngine>,
}

pub fn router(engine: Arc<LedgerEngine>) -> Router {
    Router::new()
        .route(
            "/units/{unit}/intents",
            post(intents::create).get(reports::intents),
        )
        .route("/intents/{reference}", get(intents::show))
        .route("/intents/{reference}/status", get(intents::status))
        .route("/intents/{reference}/check", post(intents::check))
        .route("/webhooks/gateway", post(intents::webhook))
        .route("/units/{unit}/income", post(ledger::income))
        .route("/units/{unit}/withdrawals", post(ledger::withdrawal))
        .route("/units/{unit}/supplier-payments", post(ledger::supplier_payment))
        .route("/units/{unit}/payroll-payments", post(ledger::payroll_payment))
        .route("/units/{unit}/pools/{pool}/reset", post(ledger::reset))
        .route("/units/{unit}/balances", get(reports::balances))
        .route("/units/{unit}/sales", get(reports::sales))
        .route("/units/{unit}/ledger", get(reports::ledger))
        .route("/units/{unit}/anomalies", get(reports::anomalies))
        .with_state(AppState { engine })
}

#[derive(Debug)]
pub struct ApiError(LedgerError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        err if err.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::OrderNotFound(_) | LedgerError::IntentNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::ConflictingConfirmation { .. } | LedgerError::AlreadySettled { .. } => {
            StatusCode::CONFLICT
        }
        LedgerError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn unit(raw: &str) -> ApiResult<BusinessUnitId> {
    Ok(BusinessUnitId::new(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::IntentStatus;
    use crate::domain::pool::PoolKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_funds_maps_to_422() {
        let res = ApiError::from(LedgerError::InsufficientFunds {
            pool: PoolKind::Cash,
            available: dec!(1),
            requested: dec!(2),
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_bad_input_maps_to_422() {
        for err in [
            LedgerError::InvalidReference("nope".into()),
            LedgerError::Validation("invalid payment id".into()),
        ] {
            assert_eq!(ApiError::from(err).into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let res = ApiError::from(LedgerError::IntentNotFound("x".into())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let res = ApiError::from(LedgerError::ConflictingConfirmation {
            reference: "resto_x".into(),
            current: IntentStatus::Approved,
            attempted: IntentStatus::Rejected,
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_gateway_maps_to_502() {
        let res = ApiError::from(LedgerError::GatewayUnavailable("down".into())).into_response();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_maps_to_500() {
        let res = ApiError::from(LedgerError::internal("disk on fire")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
