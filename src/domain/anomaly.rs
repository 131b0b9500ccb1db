use crate::domain::intent::{ExternalReference, IntentStatus};
use crate::domain::order::OrderRef;
use crate::domain::pool::BusinessUnitId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something that happened in the background and needs a human to look at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    ConflictingConfirmation {
        current: IntentStatus,
        attempted: IntentStatus,
    },
    SettlementFailed {
        step: String,
        error: String,
    },
    AlreadySettled {
        order: OrderRef,
        settled_by: Option<ExternalReference>,
    },
    OrderNotFound {
        order: OrderRef,
    },
    UnknownReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub business_unit: BusinessUnitId,
    pub reference: ExternalReference,
    pub detail: AnomalyKind,
    pub recorded_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn new(reference: &ExternalReference, detail: AnomalyKind) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            business_unit: reference.business_unit().clone(),
            reference: reference.clone(),
            detail,
            recorded_at: Utc::now(),
        }
    }
}
