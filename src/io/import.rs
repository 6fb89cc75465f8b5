use std::io::Read;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::domain::{cents_from_f64, parse_cents, BudgetInput, Cents, ImportItem, NewTransaction};

/// One CSV row: `amount,category,description,date`
#[derive(Debug, Deserialize)]
struct CsvRow {
    amount: String,
    category: String,
    #[serde(default)]
    description: String,
    date: String,
}

/// JSON amounts may arrive as numbers or as decimal strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct JsonRow {
    amount: RawAmount,
    category: String,
    #[serde(default)]
    description: String,
    date: String,
}

/// Read a batch of transactions from CSV with a header row.
///
/// A row that cannot be parsed becomes a pre-parse failure at its
/// position; only an unreadable header fails the whole read.
pub fn read_transactions_csv<R: Read>(reader: R) -> Result<Vec<ImportItem>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader
        .headers()
        .context("Failed to read CSV header")?;

    let items = csv_reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(index, row)| match row {
            Ok(row) => to_item(
                index,
                parse_cents(&row.amount).map_err(|e| e.to_string()),
                row.category,
                row.description,
                &row.date,
            ),
            Err(e) => ImportItem::unparsable(index, format!("invalid record: {}", e)),
        })
        .collect();
    Ok(items)
}

/// Read a batch of transactions from a JSON array of objects.
pub fn read_transactions_json<R: Read>(reader: R) -> Result<Vec<ImportItem>> {
    let values: Vec<serde_json::Value> =
        serde_json::from_reader(reader).context("Failed to parse transactions JSON")?;

    let items = values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match serde_json::from_value::<JsonRow>(value) {
            Ok(row) => {
                let amount = match row.amount {
                    RawAmount::Number(n) => cents_from_f64(n),
                    RawAmount::Text(s) => parse_cents(&s),
                };
                to_item(
                    index,
                    amount.map_err(|e| e.to_string()),
                    row.category,
                    row.description,
                    &row.date,
                )
            }
            Err(e) => ImportItem::unparsable(index, format!("invalid record: {}", e)),
        })
        .collect();
    Ok(items)
}

/// Read budgets from a JSON array; unknown fields are rejected.
pub fn read_budgets_json<R: Read>(reader: R) -> Result<Vec<BudgetInput>> {
    serde_json::from_reader(reader).context("Failed to parse budgets JSON")
}

/// Parse a date given as RFC 3339 or `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = parse_day(s)?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Parse a calendar day in `YYYY-MM-DD` format.
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Date must be in YYYY-MM-DD format: {}", s))
}

fn to_item(
    index: usize,
    amount: std::result::Result<Cents, String>,
    category: String,
    description: String,
    date: &str,
) -> ImportItem {
    let amount_cents = match amount {
        Ok(amount_cents) => amount_cents,
        Err(e) => return ImportItem::unparsable(index, format!("invalid amount: {}", e)),
    };
    match parse_date(date) {
        Ok(date) => ImportItem::parsed(
            index,
            NewTransaction::new(amount_cents, category, description, date),
        ),
        Err(_) => ImportItem::unparsable(index, "invalid date"),
    }
}
