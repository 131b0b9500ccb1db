//! Orders and tables as seen by the ledger.
//!
//! The order-management system owns the order lifecycle. The ledger only reads an
//! order and performs the `occupied/served -> settled -> free` step once a payment
//! for it is confirmed.

use crate::domain::intent::ExternalReference;
use crate::domain::money::Balance;
use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    DineIn,
    Takeaway,
    Delivery,
}

impl Channel {
    fn prefix(&self) -> &'static str {
        match self {
            Channel::DineIn => "table",
            Channel::Takeaway => "takeaway",
            Channel::Delivery => "delivery",
        }
    }
}

/// Reference to a table (dine-in) or a takeaway/delivery order, e.g. `table:12`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderRef {
    channel: Channel,
    id: String,
}

impl OrderRef {
    pub fn new(channel: Channel, id: impl Into<String>) -> Result<Self, LedgerError> {
        let id = id.into();
        if id.is_empty() || id.contains(['/', ' ']) {
            return Err(LedgerError::Validation(format!("invalid order id \"{id}\"")));
        }
        Ok(Self { channel, id })
    }

    pub fn table(id: impl Into<String>) -> Result<Self, LedgerError> {
        Self::new(Channel::DineIn, id)
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for OrderRef {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| LedgerError::Validation(format!("invalid order reference \"{s}\"")))?;
        let channel = match prefix {
            "table" => Channel::DineIn,
            "takeaway" => Channel::Takeaway,
            "delivery" => Channel::Delivery,
            other => {
                return Err(LedgerError::Validation(format!(
                    "unknown order channel \"{other}\""
                )));
            }
        };
        Self::new(channel, id)
    }
}

impl TryFrom<String> for OrderRef {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderRef> for String {
    fn from(order: OrderRef) -> Self {
        order.to_string()
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel.prefix(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Free,
    Occupied,
    Served,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// What the order-management system reports about an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub reference: OrderRef,
    pub state: OrderState,
    pub total: Balance,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub customer: Option<String>,
    /// Reference of the payment that settled the order, if any.
    #[serde(default)]
    pub settled_by: Option<ExternalReference>,
}

impl OrderSnapshot {
    pub fn occupied(reference: OrderRef, line_items: Vec<LineItem>) -> Self {
        let total = line_items
            .iter()
            .map(|item| Balance::new(item.unit_price * Decimal::from(item.quantity)))
            .sum();
        Self {
            reference,
            state: OrderState::Occupied,
            total,
            line_items,
            customer: None,
            settled_by: None,
        }
    }
}

/// A state change requested from the order-management system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub state: OrderState,
    /// Clear line items, total and customer fields.
    pub clear_fields: bool,
    pub settled_by: Option<ExternalReference>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_ref_round_trips_through_display() {
        let order: OrderRef = "delivery:A-77".parse().unwrap();
        assert_eq!(order.channel(), Channel::Delivery);
        assert_eq!(order.id(), "A-77");
        assert_eq!(order.to_string(), "delivery:A-77");
    }

    #[test]
    fn test_order_ref_rejects_unknown_channel() {
        assert!("bar:1".parse::<OrderRef>().is_err());
        assert!("table".parse::<OrderRef>().is_err());
        assert!("table:".parse::<OrderRef>().is_err());
    }

    #[test]
    fn test_occupied_snapshot_totals_line_items() {
        let order = OrderSnapshot::occupied(
            OrderRef::table("4").unwrap(),
            vec![
                LineItem {
                    name: "milanesa".into(),
                    quantity: 2,
                    unit_price: dec!(1000),
                },
                LineItem {
                    name: "agua".into(),
                    quantity: 1,
                    unit_price: dec!(500),
                },
            ],
        );
        assert_eq!(order.total, Balance::new(dec!(2500)));
        assert_eq!(order.state, OrderState::Occupied);
    }
}
