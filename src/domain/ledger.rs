use crate::domain::intent::ExternalReference;
use crate::domain::money::{Amount, Balance};
use crate::domain::order::{Channel, OrderRef};
use crate::domain::pool::{BusinessUnitId, PoolKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    /// Cash or virtual withdrawal ("alivio").
    Withdrawal,
    SupplierPayment,
    PayrollPayment,
    /// Administrative zeroing of a pool.
    BalanceReset,
}

impl EntryKind {
    pub fn is_outgoing(&self) -> bool {
        !matches!(self, EntryKind::Income)
    }

    /// Whether the resulting pool balance must stay non-negative.
    pub fn requires_funds(&self) -> bool {
        self.is_outgoing()
    }

    /// The delta this kind of entry applies to its pool.
    pub fn signed(&self, amount: Amount) -> Balance {
        let amount = Balance::from(amount);
        if self.is_outgoing() { -amount } else { amount }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Income => "income",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::SupplierPayment => "supplier_payment",
            EntryKind::PayrollPayment => "payroll_payment",
            EntryKind::BalanceReset => "balance_reset",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a ledger entry. Sale entries derive it from the payment reference so a
/// replayed confirmation lands on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn for_sale(reference: &ExternalReference) -> Self {
        Self(format!("sale-{reference}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Links a sale-derived income entry to the payment and order it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLink {
    pub reference: ExternalReference,
    pub order_ref: OrderRef,
}

/// One money movement. Never mutated once written; corrections are new entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub business_unit: BusinessUnitId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub pool: PoolKind,
    /// Always set on write. Older records may lack it.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    pub created_by: String,
    #[serde(default)]
    pub sale: Option<SaleLink>,
}

impl LedgerEntry {
    pub fn delta(&self) -> Balance {
        self.kind.signed(self.amount)
    }

    /// Sales channel of sale-derived income; `None` for anything else.
    pub fn channel(&self) -> Option<Channel> {
        self.sale.as_ref().map(|sale| sale.order_ref.channel())
    }
}

/// Request to record a ledger entry, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub kind: EntryKind,
    pub amount: rust_decimal::Decimal,
    pub pool: PoolKind,
    pub note: Option<String>,
    pub counterparty: Option<String>,
    pub created_by: String,
    /// Idempotency key; generated when absent.
    pub id: Option<EntryId>,
    pub sale: Option<SaleLink>,
}

impl NewEntry {
    pub fn new(
        kind: EntryKind,
        amount: rust_decimal::Decimal,
        pool: PoolKind,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            amount,
            pool,
            note: None,
            counterparty: None,
            created_by: created_by.into(),
            id: None,
            sale: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_sign() {
        let amount = Amount::new(dec!(25)).unwrap();
        assert_eq!(EntryKind::Income.signed(amount), Balance::new(dec!(25)));
        assert_eq!(EntryKind::Withdrawal.signed(amount), Balance::new(dec!(-25)));
        assert_eq!(EntryKind::PayrollPayment.signed(amount), Balance::new(dec!(-25)));
        assert_eq!(EntryKind::BalanceReset.signed(amount), Balance::new(dec!(-25)));
    }

    #[test]
    fn test_only_income_skips_funds_check() {
        assert!(EntryKind::SupplierPayment.requires_funds());
        assert!(EntryKind::BalanceReset.requires_funds());
        assert!(!EntryKind::Income.requires_funds());
    }

    #[test]
    fn test_sale_entry_id_is_stable() {
        let unit = BusinessUnitId::new("resto").unwrap();
        let reference = ExternalReference::new(&unit, "abc").unwrap();
        assert_eq!(EntryId::for_sale(&reference), EntryId::for_sale(&reference));
        assert_eq!(EntryId::for_sale(&reference).as_str(), "sale-resto_abc");
    }

    #[test]
    fn test_entry_without_timestamp_deserializes() {
        let json = r#"{
            "id": "legacy-1",
            "business_unit": "resto",
            "kind": "income",
            "amount": "10",
            "pool": "cash",
            "created_by": "import"
        }"#;
        let entry: LedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.timestamp, None);
        assert_eq!(entry.channel(), None);
    }
}
