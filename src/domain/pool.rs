use crate::domain::money::Balance;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_UNIT_ID_LEN: usize = 64;

/// Tenant scope of every pool, entry and intent: a single restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusinessUnitId(String);

impl BusinessUnitId {
    pub fn new(raw: impl Into<String>) -> Result<Self, LedgerError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_UNIT_ID_LEN {
            return Err(LedgerError::Validation(format!(
                "business unit id must be 1..={MAX_UNIT_ID_LEN} characters"
            )));
        }
        // '_' separates the unit from the token in external references
        if raw.contains(['_', '/']) || raw.chars().any(char::is_whitespace) {
            return Err(LedgerError::Validation(format!(
                "business unit id \"{raw}\" contains a reserved character"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BusinessUnitId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BusinessUnitId> for String {
    fn from(id: BusinessUnitId) -> Self {
        id.0
    }
}

impl FromStr for BusinessUnitId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for BusinessUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Cash,
    Virtual,
}

impl PoolKind {
    pub const ALL: [PoolKind; 2] = [PoolKind::Cash, PoolKind::Virtual];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Cash => "cash",
            PoolKind::Virtual => "virtual",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PoolKind::Cash),
            "virtual" => Ok(PoolKind::Virtual),
            other => Err(LedgerError::Validation(format!("unknown pool \"{other}\""))),
        }
    }
}

/// One of the two money totals of a business unit.
///
/// `amount` is authoritative. It only changes through a versioned commit in the
/// ledger store, so every write states the version it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancePool {
    pub business_unit: BusinessUnitId,
    pub kind: PoolKind,
    /// Amount the pool held when it was created or last reset.
    pub opening_amount: Balance,
    pub amount: Balance,
    pub version: u64,
    pub last_updated_at: DateTime<Utc>,
}

impl BalancePool {
    pub fn empty(business_unit: BusinessUnitId, kind: PoolKind, now: DateTime<Utc>) -> Self {
        Self::opened(business_unit, kind, Balance::ZERO, now)
    }

    pub fn opened(
        business_unit: BusinessUnitId,
        kind: PoolKind,
        opening_amount: Balance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            business_unit,
            kind,
            opening_amount,
            amount: opening_amount,
            version: 0,
            last_updated_at: now,
        }
    }

    /// Returns the next version of this pool with `delta` applied.
    pub fn adjusted(&self, delta: Balance, now: DateTime<Utc>) -> Self {
        Self {
            amount: self.amount + delta,
            version: self.version + 1,
            last_updated_at: now,
            ..self.clone()
        }
    }

    /// Storage key shared by every backend.
    pub fn key(business_unit: &BusinessUnitId, kind: PoolKind) -> String {
        format!("{business_unit}/{kind}")
    }
}
