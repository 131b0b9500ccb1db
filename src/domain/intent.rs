use crate::domain::money::Amount;
use crate::domain::order::OrderRef;
use crate::domain::pool::{BusinessUnitId, PoolKind};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Gateway-facing identifier of a payment intent: `{business_unit}_{token}`.
///
/// Globally unique, and the idempotency key for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalReference {
    business_unit: BusinessUnitId,
    token: String,
}

impl ExternalReference {
    /// Builds a reference from a caller-supplied idempotency token.
    pub fn new(business_unit: &BusinessUnitId, token: &str) -> Result<Self, LedgerError> {
        let token = token.trim();
        if token.is_empty() || token.len() > 128 || token.contains('/') {
            return Err(LedgerError::InvalidReference(format!(
                "invalid idempotency token \"{token}\""
            )));
        }
        Ok(Self {
            business_unit: business_unit.clone(),
            token: token.to_string(),
        })
    }

    /// Builds a reference with a fresh time-ordered token.
    pub fn generate(business_unit: &BusinessUnitId) -> Self {
        Self {
            business_unit: business_unit.clone(),
            token: Uuid::now_v7().simple().to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let (unit, token) = raw
            .split_once('_')
            .ok_or_else(|| LedgerError::InvalidReference(raw.to_string()))?;
        let unit =
            BusinessUnitId::new(unit).map_err(|_| LedgerError::InvalidReference(raw.to_string()))?;
        Self::new(&unit, token)
    }

    pub fn business_unit(&self) -> &BusinessUnitId {
        &self.business_unit
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl TryFrom<String> for ExternalReference {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExternalReference> for String {
    fn from(reference: ExternalReference) -> Self {
        reference.to_string()
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.business_unit, self.token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Created,
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Result of applying a reported status to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move forward to the given status.
    Advance(IntentStatus),
    /// Same status reported again.
    Unchanged,
    /// An older status arrived late; nothing to do.
    Stale,
    /// A terminal intent was reported with a different terminal status.
    Conflict {
        current: IntentStatus,
        attempted: IntentStatus,
    },
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Approved | IntentStatus::Rejected | IntentStatus::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            IntentStatus::Created => 0,
            IntentStatus::Pending => 1,
            IntentStatus::Approved | IntentStatus::Rejected | IntentStatus::Cancelled => 2,
        }
    }

    /// State machine: `created -> pending -> {approved | rejected | cancelled}`.
    ///
    /// Never moves backward. `created` may jump straight to a terminal status.
    pub fn transition_to(self, next: IntentStatus) -> Transition {
        if self == next {
            return Transition::Unchanged;
        }
        if self.is_terminal() {
            return if next.is_terminal() {
                Transition::Conflict {
                    current: self,
                    attempted: next,
                }
            } else {
                Transition::Stale
            };
        }
        if next.rank() > self.rank() {
            Transition::Advance(next)
        } else {
            Transition::Stale
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentStatus::Created => "created",
            IntentStatus::Pending => "pending",
            IntentStatus::Approved => "approved",
            IntentStatus::Rejected => "rejected",
            IntentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Payment status in the gateway's own wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    InProcess,
    Authorized,
    InMediation,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
}

impl FromStr for GatewayStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "pending" => GatewayStatus::Pending,
            "in_process" => GatewayStatus::InProcess,
            "authorized" => GatewayStatus::Authorized,
            "in_mediation" => GatewayStatus::InMediation,
            "approved" => GatewayStatus::Approved,
            "rejected" => GatewayStatus::Rejected,
            "cancelled" => GatewayStatus::Cancelled,
            "refunded" => GatewayStatus::Refunded,
            "charged_back" => GatewayStatus::ChargedBack,
            other => {
                return Err(LedgerError::Validation(format!(
                    "unknown gateway status \"{other}\""
                )));
            }
        };
        Ok(status)
    }
}

impl From<GatewayStatus> for IntentStatus {
    fn from(status: GatewayStatus) -> Self {
        match status {
            GatewayStatus::Pending
            | GatewayStatus::InProcess
            | GatewayStatus::Authorized
            | GatewayStatus::InMediation => IntentStatus::Pending,
            GatewayStatus::Approved => IntentStatus::Approved,
            GatewayStatus::Rejected => IntentStatus::Rejected,
            GatewayStatus::Cancelled | GatewayStatus::Refunded | GatewayStatus::ChargedBack => {
                IntentStatus::Cancelled
            }
        }
    }
}

/// What the customer needs to pay: a checkout URL, optionally rendered as a QR code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectPayload {
    pub preference_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseState {
    #[default]
    Pending,
    Released,
    /// The order could not be released (gone, or settled by another payment).
    /// Recorded as an anomaly; the money stays recorded.
    NeedsReview,
}

/// Side effects of an approval that have been applied so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub income_recorded: bool,
    pub release: ReleaseState,
    pub attempts: u32,
}

impl Settlement {
    pub fn is_complete(&self) -> bool {
        self.income_recorded && self.release != ReleaseState::Pending
    }
}

/// One attempt to collect money for an order through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub reference: ExternalReference,
    pub business_unit: BusinessUnitId,
    pub order_ref: OrderRef,
    pub amount: Amount,
    pub description: String,
    /// Pool credited when the payment is approved.
    pub pool: PoolKind,
    pub status: IntentStatus,
    pub redirect: Option<RedirectPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settlement: Settlement,
    pub version: u64,
}

impl PaymentIntent {
    pub fn new(
        reference: ExternalReference,
        order_ref: OrderRef,
        amount: Amount,
        description: String,
        pool: PoolKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            business_unit: reference.business_unit().clone(),
            reference,
            order_ref,
            amount,
            description,
            pool,
            status: IntentStatus::Created,
            redirect: None,
            created_at: now,
            updated_at: now,
            settled_at: None,
            settlement: Settlement::default(),
            version: 0,
        }
    }

    /// Needs its approval side effects applied (again).
    pub fn needs_settlement(&self) -> bool {
        self.status == IntentStatus::Approved && !self.settlement.is_complete()
    }
}
