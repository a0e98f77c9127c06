use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ledgerdesk_api::db::{Built, migrations::MIGRATIONS};
use ledgerdesk_api::service::document_number;
use ledgerdesk_api::{
    AccountResponse, AssetResponse, CategoryResponse, CategoryType, ClientResponse,
    ContactResponse, DocumentResponse, EmailResponse, EmailStatus, EmployeeResponse, Frequency,
    InvoiceResponse, InvoiceStatus, ItemResponse, LocationResponse, PaymentMethod,
    PaymentResponse, ProductResponse, ProjectResponse, QuoteResponse, QuoteStatus,
    RecurringResponse, RecurringStatus, ReplyKind, ReplyResponse, SubscriptionResponse,
    TaxResponse, TicketPriority, TicketResponse, TicketStatus, TransactionResponse, UserResponse,
    UserRole,
};
use ledgerdesk_core::billing::LineItem;
use ledgerdesk_core::money::round_money;
use ledgerdesk_core::recurring::RecurringSchedule;
use ledgerdesk_core::worktime::format_hms;

pub const DB_FILE_NAME: &str = "ledgerdesk.db";

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Lock the connection. Never hold the guard across an `.await`.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for &(name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .with_context(|| format!("checking migration {name}"))?;

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ── sea-query bridge ───────────────────────────────────────────────────────

fn to_sqlite(value: &sea_query::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as V;
    use sea_query::Value as Q;
    match value {
        Q::Bool(Some(b)) => V::Integer(i64::from(*b)),
        Q::TinyInt(Some(i)) => V::Integer(i64::from(*i)),
        Q::SmallInt(Some(i)) => V::Integer(i64::from(*i)),
        Q::Int(Some(i)) => V::Integer(i64::from(*i)),
        Q::BigInt(Some(i)) => V::Integer(*i),
        Q::TinyUnsigned(Some(u)) => V::Integer(i64::from(*u)),
        Q::SmallUnsigned(Some(u)) => V::Integer(i64::from(*u)),
        Q::Unsigned(Some(u)) => V::Integer(i64::from(*u)),
        Q::BigUnsigned(Some(u)) => V::Integer(i64::try_from(*u).unwrap_or(i64::MAX)),
        Q::Float(Some(f)) => V::Real(f64::from(*f)),
        Q::Double(Some(f)) => V::Real(*f),
        Q::String(Some(s)) => V::Text(s.as_ref().clone()),
        Q::Char(Some(c)) => V::Text(c.to_string()),
        Q::Bytes(Some(b)) => V::Blob(b.as_ref().clone()),
        _ => V::Null,
    }
}

fn params(values: &sea_query::Values) -> Vec<rusqlite::types::Value> {
    values.0.iter().map(to_sqlite).collect()
}

pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, rusqlite::params_from_iter(params(&values)))
}

/// Execute an INSERT and return the new row id.
pub fn sq_insert(conn: &Connection, built: Built) -> rusqlite::Result<i64> {
    sq_execute(conn, built)?;
    Ok(conn.last_insert_rowid())
}

pub fn sq_query_row<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(&sql, rusqlite::params_from_iter(params(&values)), f)
}

/// Like [`sq_query_row`], with "no rows" as `None`.
pub fn sq_find<T, F>(conn: &Connection, built: Built, f: F) -> rusqlite::Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    sq_query_row(conn, built, f).optional()
}

pub fn sq_query_map<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params(&values)), f)?;
    rows.collect()
}

// ── Column decoders ────────────────────────────────────────────────────────

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Money and quantities are stored as decimal text.
pub fn decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| conversion_error(idx, format!("invalid decimal {text:?}: {e}")))
}

pub fn opt_decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse()
            .map_err(|e| conversion_error(idx, format!("invalid decimal {t:?}: {e}")))
    })
    .transpose()
}

fn enum_col<T>(row: &Row<'_>, idx: usize, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| conversion_error(idx, format!("unexpected value {text:?}")))
}

fn opt_enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse(&t).ok_or_else(|| conversion_error(idx, format!("unexpected value {t:?}"))))
        .transpose()
}

/// Sum a single decimal column of every row.
pub fn sum_decimals(conn: &Connection, built: Built) -> rusqlite::Result<Decimal> {
    let amounts = sq_query_map(conn, built, |row| decimal_col(row, 0))?;
    Ok(amounts.into_iter().sum())
}

/// `COUNT(*)` / `MAX(...)` style single-value queries.
pub fn scalar_i64(conn: &Connection, built: Built) -> rusqlite::Result<Option<i64>> {
    sq_query_row(conn, built, |row| row.get(0))
}

// ── Row mappers ────────────────────────────────────────────────────────────

pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserResponse> {
    Ok(UserResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: enum_col(row, 3, UserRole::parse)?,
        created_at: row.get(4)?,
    })
}

pub fn client_from_row(row: &Row<'_>) -> rusqlite::Result<ClientResponse> {
    Ok(ClientResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        website: row.get(4)?,
        net_terms: row.get(5)?,
        hourly_rate: opt_decimal_col(row, 6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        archived_at: row.get(9)?,
    })
}

pub fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<ContactResponse> {
    Ok(ContactResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        title: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        is_primary: row.get(6)?,
        created_at: row.get(7)?,
        archived_at: row.get(8)?,
    })
}

pub fn location_from_row(row: &Row<'_>) -> rusqlite::Result<LocationResponse> {
    Ok(LocationResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        address: row.get(3)?,
        city: row.get(4)?,
        state: row.get(5)?,
        zip: row.get(6)?,
        phone: row.get(7)?,
        is_primary: row.get(8)?,
        created_at: row.get(9)?,
        archived_at: row.get(10)?,
    })
}

pub fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentResponse> {
    Ok(DocumentResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        archived_at: row.get(6)?,
    })
}

pub fn tax_from_row(row: &Row<'_>) -> rusqlite::Result<TaxResponse> {
    Ok(TaxResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        percent: decimal_col(row, 2)?,
        archived_at: row.get(3)?,
    })
}

pub fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CategoryResponse> {
    Ok(CategoryResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        category_type: enum_col(row, 2, CategoryType::parse)?,
        color: row.get(3)?,
        archived_at: row.get(4)?,
    })
}

pub fn product_from_row(row: &Row<'_>) -> rusqlite::Result<ProductResponse> {
    Ok(ProductResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: decimal_col(row, 3)?,
        tax_id: row.get(4)?,
        category_id: row.get(5)?,
        archived_at: row.get(6)?,
    })
}

pub fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<InvoiceResponse> {
    let prefix: String = row.get(2)?;
    let number: i64 = row.get(3)?;
    Ok(InvoiceResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        number: document_number(&prefix, number),
        status: enum_col(row, 4, InvoiceStatus::parse)?,
        date: row.get::<_, NaiveDate>(5)?,
        due_date: row.get::<_, NaiveDate>(6)?,
        discount: decimal_col(row, 7)?,
        note: row.get(8)?,
        created_at: row.get(9)?,
        archived_at: row.get(10)?,
    })
}

pub fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<QuoteResponse> {
    let prefix: String = row.get(2)?;
    let number: i64 = row.get(3)?;
    Ok(QuoteResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        number: document_number(&prefix, number),
        status: enum_col(row, 4, QuoteStatus::parse)?,
        date: row.get::<_, NaiveDate>(5)?,
        expire_date: row.get::<_, Option<NaiveDate>>(6)?,
        discount: decimal_col(row, 7)?,
        note: row.get(8)?,
        invoice_id: row.get(9)?,
        created_at: row.get(10)?,
        archived_at: row.get(11)?,
    })
}

/// Decodes the line and fills in its computed amounts.
pub fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemResponse> {
    let quantity = decimal_col(row, 4)?;
    let price = decimal_col(row, 5)?;
    let discount = decimal_col(row, 6)?;
    let tax_percent = opt_decimal_col(row, 8)?;
    let line = LineItem {
        quantity,
        price,
        discount,
        tax_percent,
    };
    Ok(ItemResponse {
        id: row.get(0)?,
        product_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        quantity,
        price,
        discount,
        tax_id: row.get(7)?,
        tax_percent,
        subtotal: round_money(line.subtotal()),
        tax: round_money(line.tax()),
        total: line.total(),
    })
}

pub fn line_item(item: &ItemResponse) -> LineItem {
    LineItem {
        quantity: item.quantity,
        price: item.price,
        discount: item.discount,
        tax_percent: item.tax_percent,
    }
}

pub fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentResponse> {
    Ok(PaymentResponse {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        account_id: row.get(2)?,
        date: row.get::<_, NaiveDate>(3)?,
        amount: decimal_col(row, 4)?,
        method: opt_enum_col(row, 5, PaymentMethod::parse)?,
        reference: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn recurring_from_row(row: &Row<'_>) -> rusqlite::Result<RecurringResponse> {
    let frequency = enum_col(row, 3, |s| s.parse::<Frequency>().ok())?;
    let start_date: NaiveDate = row.get(4)?;
    let occurrences: Option<u32> = row.get(5)?;
    let completed: u32 = row.get(6)?;
    let status = enum_col(row, 9, RecurringStatus::parse)?;
    let schedule = RecurringSchedule {
        start: start_date,
        frequency,
        limit: occurrences,
        completed,
    };
    let next_date = if status == RecurringStatus::Active {
        schedule.next_date()
    } else {
        None
    };
    Ok(RecurringResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        amount: decimal_col(row, 2)?,
        frequency,
        start_date,
        occurrences,
        completed,
        remaining: schedule.remaining(),
        next_date,
        method: opt_enum_col(row, 7, PaymentMethod::parse)?,
        description: row.get(8)?,
        status,
        last_processed_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Rebuild the schedule of a decoded recurring payment.
pub fn schedule_of(rec: &RecurringResponse) -> RecurringSchedule {
    RecurringSchedule {
        start: rec.start_date,
        frequency: rec.frequency,
        limit: rec.occurrences,
        completed: rec.completed,
    }
}

pub fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionResponse> {
    let quantity = decimal_col(row, 4)?;
    let price = decimal_col(row, 5)?;
    Ok(SubscriptionResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        product_id: row.get(2)?,
        product_name: row.get(3)?,
        quantity,
        price,
        monthly_amount: ledgerdesk_api::service::monthly_amount(quantity, price),
        created_at: row.get(6)?,
    })
}

pub fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<TicketResponse> {
    let prefix: String = row.get(1)?;
    let number: i64 = row.get(2)?;
    Ok(TicketResponse {
        id: row.get(0)?,
        number: document_number(&prefix, number),
        client_id: row.get(3)?,
        contact_id: row.get(4)?,
        project_id: row.get(5)?,
        subject: row.get(6)?,
        details: row.get(7)?,
        priority: enum_col(row, 8, TicketPriority::parse)?,
        status: enum_col(row, 9, TicketStatus::parse)?,
        assigned_to: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        closed_at: row.get(14)?,
    })
}

/// Reply plus its raw seconds, for summing.
pub fn reply_from_row(row: &Row<'_>) -> rusqlite::Result<(ReplyResponse, i64)> {
    let secs: i64 = row.get(5)?;
    Ok((
        ReplyResponse {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            user_id: row.get(2)?,
            body: row.get(3)?,
            kind: enum_col(row, 4, ReplyKind::parse)?,
            time_worked: format_hms(secs),
            created_at: row.get(6)?,
        },
        secs,
    ))
}

pub fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectResponse> {
    Ok(ProjectResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        due_date: row.get::<_, Option<NaiveDate>>(4)?,
        completed_at: row.get(5)?,
        created_at: row.get(6)?,
        archived_at: row.get(7)?,
    })
}

pub fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<EmployeeResponse> {
    Ok(EmployeeResponse {
        id: row.get(0)?,
        external_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        title: row.get(5)?,
        hourly_rate: opt_decimal_col(row, 6)?,
        created_at: row.get(7)?,
        archived_at: row.get(8)?,
    })
}

/// A time entry without its breaks.
#[derive(Debug, Clone)]
pub struct EntryRow {
    pub id: i64,
    pub employee_id: i64,
    pub clock_in: NaiveDateTime,
    pub clock_out: Option<NaiveDateTime>,
    pub note: Option<String>,
}

pub fn time_entry_from_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        clock_in: row.get(2)?,
        clock_out: row.get(3)?,
        note: row.get(4)?,
    })
}

/// `(entry_id, break_id, start, end)`.
pub fn break_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, NaiveDateTime, NaiveDateTime)> {
    Ok((row.get(1)?, row.get(0)?, row.get(2)?, row.get(3)?))
}

pub fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountResponse> {
    Ok(AccountResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        account_type: row.get(2)?,
        currency: row.get(3)?,
        opening_balance: decimal_col(row, 4)?,
        plaid_linked: row.get(5)?,
        created_at: row.get(6)?,
        archived_at: row.get(7)?,
    })
}

pub fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionResponse> {
    Ok(TransactionResponse {
        id: row.get(0)?,
        account_id: row.get(1)?,
        plaid_transaction_id: row.get(2)?,
        date: row.get::<_, NaiveDate>(3)?,
        name: row.get(4)?,
        amount: decimal_col(row, 5)?,
        category_id: row.get(6)?,
        reconciled: row.get(7)?,
        payment_id: row.get(8)?,
    })
}

pub fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<AssetResponse> {
    Ok(AssetResponse {
        id: row.get(0)?,
        client_id: row.get(1)?,
        tag: row.get(2)?,
        name: row.get(3)?,
        asset_type: row.get(4)?,
        make: row.get(5)?,
        model: row.get(6)?,
        serial: row.get(7)?,
        purchase_date: row.get::<_, Option<NaiveDate>>(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        archived_at: row.get(11)?,
    })
}

pub fn email_from_row(row: &Row<'_>) -> rusqlite::Result<EmailResponse> {
    Ok(EmailResponse {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        status: enum_col(row, 5, EmailStatus::parse)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        sent_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_api::db;

    fn open() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn migrations_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        init_db(dir.path()).unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn money_round_trips_as_text() {
        let (_dir, db) = open();
        let conn = db.conn();
        let id = sq_insert(
            &conn,
            db::catalog::insert_tax("GST", "12.375".parse().unwrap()),
        )
        .unwrap();
        let tax = sq_query_row(&conn, db::catalog::get_tax(id), tax_from_row).unwrap();
        assert_eq!(tax.percent.to_string(), "12.375");
        let stored: String = conn
            .query_row("SELECT percent FROM taxes WHERE id = ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "12.375");
    }

    #[test]
    fn missing_row_is_none() {
        let (_dir, db) = open();
        let conn = db.conn();
        let found = sq_find(&conn, db::clients::get(42), client_from_row).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn bad_enum_text_is_a_conversion_error() {
        let (_dir, db) = open();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO users (name, email, role, api_key_hash) VALUES ('a', 'a@x', 'root', 'h')",
            [],
        )
        .unwrap();
        let err = sq_query_row(&conn, db::users::get(1), user_from_row).unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(3, _, _)));
    }
}
