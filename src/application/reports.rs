use crate::domain::anomaly::Anomaly;
use crate::domain::intent::PaymentIntent;
use crate::domain::ledger::{EntryKind, LedgerEntry};
use crate::domain::money::Balance;
use crate::domain::order::Channel;
use crate::domain::pool::{BusinessUnitId, PoolKind};
use crate::domain::ports::{AnomalyLogRef, IntentStoreRef, LedgerStoreRef};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub business_unit: BusinessUnitId,
    pub cash: Balance,
    #[serde(rename = "virtual")]
    pub virtual_amount: Balance,
    pub total: Balance,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Window of a sales report, in the restaurant's local calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    /// Monday of the current week up to now.
    Week,
    /// First day of the current month up to now.
    Month,
    /// Both days inclusive.
    Range { from: NaiveDate, to: NaiveDate },
}

impl Period {
    pub fn parse(name: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        match name {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "range" => match (from, to) {
                (Some(from), Some(to)) => Ok(Period::Range { from, to }),
                _ => Err(LedgerError::Validation(
                    "range period needs both from and to".to_string(),
                )),
            },
            other => Err(LedgerError::Validation(format!("unknown period \"{other}\""))),
        }
    }

    /// `[start, end)` in UTC.
    pub fn window(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.with_timezone(&offset).date_naive();
        let (first, last) = match *self {
            Period::Today => (today, today),
            Period::Week => {
                let back = u64::from(today.weekday().num_days_from_monday());
                (shift(today.checked_sub_days(Days::new(back)))?, today)
            }
            Period::Month => (shift(today.with_day(1))?, today),
            Period::Range { from, to } => {
                if from > to {
                    return Err(LedgerError::Validation(format!(
                        "range starts after it ends ({from} > {to})"
                    )));
                }
                (from, to)
            }
        };
        let after = shift(last.checked_add_days(Days::new(1)))?;
        Ok((local_midnight(first, offset)?, local_midnight(after, offset)?))
    }
}

fn shift(date: Option<NaiveDate>) -> Result<NaiveDate> {
    date.ok_or_else(|| LedgerError::Validation("date out of range".to_string()))
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| LedgerError::Validation(format!("no local midnight on {date}")))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelTotals {
    pub dine_in: Balance,
    pub takeaway: Balance,
    pub delivery: Balance,
}

impl ChannelTotals {
    fn add(&mut self, channel: Channel, amount: Balance) {
        match channel {
            Channel::DineIn => self.dine_in += amount,
            Channel::Takeaway => self.takeaway += amount,
            Channel::Delivery => self.delivery += amount,
        }
    }

    pub fn total(&self) -> Balance {
        self.dine_in + self.takeaway + self.delivery
    }
}

/// Income entries without a timestamp. They can't be placed in any period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UndatedBucket {
    pub amount: Balance,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub business_unit: BusinessUnitId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub by_channel: ChannelTotals,
    /// Sum of the channel buckets.
    pub total: Balance,
    pub sales_count: usize,
    /// Income recorded by hand, outside the sale flow.
    pub manual: Balance,
    pub undated: UndatedBucket,
}

/// Read-side rollups. Nothing here writes.
pub struct Reports {
    ledger: LedgerStoreRef,
    intents: IntentStoreRef,
    anomalies: AnomalyLogRef,
    offset: FixedOffset,
}

impl Reports {
    pub fn new(
        ledger: LedgerStoreRef,
        intents: IntentStoreRef,
        anomalies: AnomalyLogRef,
        offset: FixedOffset,
    ) -> Self {
        Self {
            ledger,
            intents,
            anomalies,
            offset,
        }
    }

    pub async fn current_balances(&self, unit: &BusinessUnitId) -> Result<BalanceSummary> {
        let mut summary = BalanceSummary {
            business_unit: unit.clone(),
            cash: Balance::ZERO,
            virtual_amount: Balance::ZERO,
            total: Balance::ZERO,
            last_updated: None,
        };
        for pool in self.ledger.pools(unit).await? {
            match pool.kind {
                PoolKind::Cash => summary.cash = pool.amount,
                PoolKind::Virtual => summary.virtual_amount = pool.amount,
            }
            summary.last_updated = summary.last_updated.max(Some(pool.last_updated_at));
        }
        summary.total = summary.cash + summary.virtual_amount;
        Ok(summary)
    }

    pub async fn sales_by_period(
        &self,
        unit: &BusinessUnitId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<SalesReport> {
        let (from, to) = period.window(now, self.offset)?;
        let mut report = SalesReport {
            business_unit: unit.clone(),
            from,
            to,
            by_channel: ChannelTotals::default(),
            total: Balance::ZERO,
            sales_count: 0,
            manual: Balance::ZERO,
            undated: UndatedBucket::default(),
        };

        for entry in self.ledger.entries(unit).await? {
            if entry.kind != EntryKind::Income {
                continue;
            }
            let amount = Balance::from(entry.amount);
            let Some(timestamp) = entry.timestamp else {
                report.undated.amount += amount;
                report.undated.count += 1;
                continue;
            };
            if timestamp < from || timestamp >= to {
                continue;
            }
            match entry.channel() {
                Some(channel) => {
                    report.by_channel.add(channel, amount);
                    report.sales_count += 1;
                }
                None => report.manual += amount,
            }
        }
        report.total = report.by_channel.total();

        if report.undated.count > 0 {
            tracing::warn!(
                business_unit = %unit,
                count = report.undated.count,
                "income entries without timestamp left out of the period"
            );
        }
        Ok(report)
    }

    /// Newest first.
    pub async fn ledger(&self, unit: &BusinessUnitId) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.ledger.entries(unit).await?;
        entries.reverse();
        Ok(entries)
    }

    pub async fn intents(&self, unit: &BusinessUnitId) -> Result<Vec<PaymentIntent>> {
        self.intents.list(unit).await
    }

    pub async fn anomalies(&self, unit: &BusinessUnitId) -> Result<Vec<Anomaly>> {
        self.anomalies.list(unit).await
    }
}
