use crate::domain::ledger::LedgerEntry;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One CSV row. Optional fields are written as empty cells.
#[derive(Serialize)]
struct LedgerRow<'a> {
    id: &'a str,
    timestamp: Option<String>,
    kind: &'static str,
    pool: &'static str,
    amount: String,
    counterparty: Option<&'a str>,
    note: Option<&'a str>,
    created_by: &'a str,
    reference: Option<String>,
}

/// Writes ledger entries as CSV with the columns
/// `id,timestamp,kind,pool,amount,counterparty,note,created_by,reference`.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

const HEADER: [&str; 9] = [
    "id",
    "timestamp",
    "kind",
    "pool",
    "amount",
    "counterparty",
    "note",
    "created_by",
    "reference",
];

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            // header is written by hand so an empty ledger still gets one
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
            header_written: false,
        }
    }

    pub fn write_entries<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<()> {
        if !self.header_written {
            self.writer.write_record(HEADER)?;
            self.header_written = true;
        }
        for entry in entries {
            self.writer.serialize(LedgerRow {
                id: entry.id.as_str(),
                timestamp: entry.timestamp.map(|ts| ts.to_rfc3339()),
                kind: entry.kind.as_str(),
                pool: entry.pool.as_str(),
                amount: entry.amount.to_string(),
                counterparty: entry.counterparty.as_deref(),
                note: entry.note.as_deref(),
                created_by: &entry.created_by,
                reference: entry.sale.as_ref().map(|sale| sale.reference.to_string()),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
