//! Recurring payment schedule import from CSV.
//!
//! Headers are matched against a list of aliases; each data row is validated
//! independently and failures are reported with their spreadsheet row
//! number (the header is row 1).

use std::io;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::billing::PaymentMethod;
use crate::money::{parse_money, round_money};
use crate::recurring::Frequency;

const CLIENT_ALIASES: &[&str] = &["client", "client_name", "customer", "customer_name", "account"];
const AMOUNT_ALIASES: &[&str] = &["amount", "payment_amount", "charge", "total"];
const FREQUENCY_ALIASES: &[&str] = &["frequency", "interval", "recurrence", "schedule"];
const START_ALIASES: &[&str] = &["start_date", "start", "first_payment", "date", "next_date"];
const OCCURRENCE_ALIASES: &[&str] = &["occurrences", "payments", "count", "limit"];
const METHOD_ALIASES: &[&str] = &["method", "payment_method", "type"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "memo", "notes"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedRecurringPayment {
    pub row: usize,
    pub client: String,
    pub amount: Decimal,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub occurrences: Option<u32>,
    pub method: Option<PaymentMethod>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub rows: Vec<ImportedRecurringPayment>,
    pub errors: Vec<RowError>,
}

impl ImportOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Normalize a header cell: lowercase, spaces and dashes become underscores.
fn normalize_header(h: &str) -> String {
    h.trim()
        .trim_start_matches('\u{feff}')
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

struct Columns {
    client: usize,
    amount: usize,
    frequency: usize,
    start: usize,
    occurrences: Option<usize>,
    method: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, CoreError> {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |aliases: &[&str]| normalized.iter().position(|h| aliases.contains(&h.as_str()));
        Ok(Self {
            client: find(CLIENT_ALIASES).ok_or(CoreError::MissingColumn("client"))?,
            amount: find(AMOUNT_ALIASES).ok_or(CoreError::MissingColumn("amount"))?,
            frequency: find(FREQUENCY_ALIASES).ok_or(CoreError::MissingColumn("frequency"))?,
            start: find(START_ALIASES).ok_or(CoreError::MissingColumn("start_date"))?,
            occurrences: find(OCCURRENCE_ALIASES),
            method: find(METHOD_ALIASES),
            description: find(DESCRIPTION_ALIASES),
        })
    }
}

/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY` and `M/D/YY`.
pub fn parse_import_date(text: &str) -> Result<NaiveDate, CoreError> {
    let text = text.trim();
    let err = || CoreError::InvalidDate(text.to_string());
    if text.contains('-') {
        return NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| err());
    }
    let parts: Vec<&str> = text.split('/').collect();
    let [m, d, y] = parts.as_slice() else {
        return Err(err());
    };
    let month: u32 = m.parse().map_err(|_| err())?;
    let day: u32 = d.parse().map_err(|_| err())?;
    let mut year: i32 = y.parse().map_err(|_| err())?;
    match y.len() {
        2 => year += 2000,
        4 => {}
        _ => return Err(err()),
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(err)
}

fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_row(record: &csv::StringRecord, cols: &Columns, row: usize) -> Result<ImportedRecurringPayment, RowError> {
    let fail = |msg: String| RowError::new(row, msg);

    let client = cell(record, Some(cols.client)).ok_or_else(|| fail("client is required".into()))?;

    let amount_text = cell(record, Some(cols.amount)).ok_or_else(|| fail("amount is required".into()))?;
    let amount = parse_money(amount_text).map_err(|e| fail(e.to_string()))?;
    if amount <= Decimal::ZERO {
        return Err(fail(format!("amount must be positive, got {amount_text}")));
    }

    let frequency = cell(record, Some(cols.frequency))
        .ok_or_else(|| fail("frequency is required".into()))?
        .parse::<Frequency>()
        .map_err(|e| fail(e.to_string()))?;

    let start_date = cell(record, Some(cols.start))
        .ok_or_else(|| fail("start date is required".into()))
        .and_then(|t| parse_import_date(t).map_err(|e| fail(e.to_string())))?;

    let occurrences = match cell(record, cols.occurrences) {
        None => None,
        Some(text) => match text.parse::<u32>() {
            Ok(0) => None,
            Ok(n) => Some(n),
            Err(_) => return Err(fail(format!("occurrences must be a whole number, got {text:?}"))),
        },
    };

    let method = match cell(record, cols.method) {
        None => None,
        Some(text) => Some(
            PaymentMethod::parse(text).ok_or_else(|| fail(format!("unknown payment method {text:?}")))?,
        ),
    };

    Ok(ImportedRecurringPayment {
        row,
        client: client.to_string(),
        amount: round_money(amount),
        frequency,
        start_date,
        occurrences,
        method,
        description: cell(record, cols.description).map(str::to_string),
    })
}

/// Parse a whole CSV file. A missing required header is a file-level error;
/// everything else is collected per row.
pub fn parse_recurring_csv<R: io::Read>(input: R) -> Result<ImportOutcome, CoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| CoreError::Csv(e.to_string()))?
        .clone();
    let cols = Columns::resolve(&headers)?;

    let mut outcome = ImportOutcome::default();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let row = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 2);
                if record.iter().all(|v| v.trim().is_empty()) {
                    continue;
                }
                match parse_row(&record, &cols, row) {
                    Ok(parsed) => outcome.rows.push(parsed),
                    Err(e) => outcome.errors.push(e),
                }
            }
            Err(e) => {
                let row = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 2);
                outcome.errors.push(RowError::new(row, format!("malformed row: {e}")));
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn accepts_header_aliases() {
        let csv = "Customer Name,Payment Amount,Interval,First-Payment,Payments,Payment Method,Memo\n\
                   Acme Corp,\"$1,200.00\",Monthly,01/15/2024,12,Credit Card,Managed services\n\
                   Globex,99.5,bi-weekly,2024-02-02,,ach,\n";
        let outcome = parse_recurring_csv(csv.as_bytes()).unwrap();
        assert!(outcome.is_clean(), "{:?}", outcome.errors);
        assert_eq!(outcome.rows.len(), 2);

        let acme = &outcome.rows[0];
        assert_eq!(acme.row, 2);
        assert_eq!(acme.client, "Acme Corp");
        assert_eq!(acme.amount, d("1200.00"));
        assert_eq!(acme.frequency, Frequency::Monthly);
        assert_eq!(acme.start_date, date("2024-01-15"));
        assert_eq!(acme.occurrences, Some(12));
        assert_eq!(acme.method, Some(PaymentMethod::Card));
        assert_eq!(acme.description.as_deref(), Some("Managed services"));

        let globex = &outcome.rows[1];
        assert_eq!(globex.row, 3);
        assert_eq!(globex.frequency, Frequency::Biweekly);
        assert_eq!(globex.occurrences, None);
        assert_eq!(globex.method, Some(PaymentMethod::Ach));
        assert_eq!(globex.description, None);
    }

    #[test]
    fn missing_required_header_rejects_file() {
        let csv = "client,amount,start_date\nAcme,10,2024-01-01\n";
        assert_eq!(
            parse_recurring_csv(csv.as_bytes()),
            Err(CoreError::MissingColumn("frequency"))
        );
    }

    #[test]
    fn reports_row_numbered_errors() {
        let csv = "client,amount,frequency,start_date,occurrences\n\
                   Acme,10,monthly,2024-01-01,3\n\
                   ,10,monthly,2024-01-01,\n\
                   Globex,-5,monthly,2024-01-01,\n\
                   Initech,10,daily,2024-01-01,\n\
                   Umbrella,10,monthly,13/45/2024,\n\
                   Hooli,10,monthly,2024-01-01,three\n";
        let outcome = parse_recurring_csv(csv.as_bytes()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
        let rows: Vec<usize> = outcome.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![3, 4, 5, 6, 7]);
        assert!(outcome.errors[0].message.contains("client"));
        assert!(outcome.errors[1].message.contains("positive"));
        assert!(outcome.errors[2].message.contains("frequency"));
        assert!(outcome.errors[3].message.contains("date"));
        assert!(outcome.errors[4].message.contains("occurrences"));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let csv = "client,amount,frequency,start_date\n,,,\nAcme,10,yearly,1/2/24\n";
        let outcome = parse_recurring_csv(csv.as_bytes()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].row, 3);
        assert_eq!(outcome.rows[0].start_date, date("2024-01-02"));
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_import_date("2024-03-05").unwrap(), date("2024-03-05"));
        assert_eq!(parse_import_date("3/5/2024").unwrap(), date("2024-03-05"));
        assert_eq!(parse_import_date("03/05/24").unwrap(), date("2024-03-05"));
        assert!(parse_import_date("2024/03/05").is_err());
        assert!(parse_import_date("02/30/2024").is_err());
        assert!(parse_import_date("yesterday").is_err());
    }
}
