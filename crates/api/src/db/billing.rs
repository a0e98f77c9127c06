//! Invoice, quote, line item and payment query builders.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_query::{
    Asterisk, Expr, Func, JoinType, Order, Query, SelectStatement, SqliteQueryBuilder,
};

use super::tables::{InvoiceItems, Invoices, Payments, Quotes, Taxes};
use super::{Built, BuiltListQuery, Changes, archived_filter, date, money, now, opt_date, opt_text};
use crate::service::PageWindow;
use crate::{InvoiceListQuery, InvoiceStatus, PaymentMethod, QuoteListQuery, QuoteStatus, UpdateInvoiceRequest};

// ── Invoices ───────────────────────────────────────────────────────────────

/// Columns: id, client_id, prefix, number, status, date, due_date, discount,
/// note, created_at, archived_at. Must match `invoice_from_row()`.
fn invoice_select() -> SelectStatement {
    Query::select()
        .columns([
            Invoices::Id,
            Invoices::ClientId,
            Invoices::Prefix,
            Invoices::Number,
            Invoices::Status,
            Invoices::Date,
            Invoices::DueDate,
            Invoices::Discount,
            Invoices::Note,
            Invoices::CreatedAt,
            Invoices::ArchivedAt,
        ])
        .from(Invoices::Table)
        .to_owned()
}

pub fn get_invoice(id: i64) -> Built {
    invoice_select()
        .and_where(Expr::col(Invoices::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn max_invoice_number(prefix: &str) -> Built {
    Query::select()
        .expr(Func::max(Expr::col(Invoices::Number)))
        .from(Invoices::Table)
        .and_where(Expr::col(Invoices::Prefix).eq(prefix))
        .build(SqliteQueryBuilder)
}

/// Parameters for inserting an invoice.
pub struct NewInvoice<'a> {
    pub client_id: i64,
    pub prefix: &'a str,
    pub number: i64,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub discount: Decimal,
    pub note: Option<&'a str>,
}

pub fn insert_invoice(p: &NewInvoice<'_>) -> Built {
    Query::insert()
        .into_table(Invoices::Table)
        .columns([
            Invoices::ClientId,
            Invoices::Prefix,
            Invoices::Number,
            Invoices::Date,
            Invoices::DueDate,
            Invoices::Discount,
            Invoices::Note,
        ])
        .values_panic([
            p.client_id.into(),
            p.prefix.into(),
            p.number.into(),
            date(p.date).into(),
            date(p.due_date).into(),
            money(p.discount).into(),
            opt_text(p.note).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn list_invoices(q: &InvoiceListQuery, window: PageWindow) -> BuiltListQuery {
    let mut count = Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Invoices::Table)
        .to_owned();
    let mut select = invoice_select();

    for stmt in [&mut count, &mut select] {
        stmt.and_where(archived_filter(Invoices::ArchivedAt, q.archived));
        if let Some(client_id) = q.client_id {
            stmt.and_where(Expr::col(Invoices::ClientId).eq(client_id));
        }
        if let Some(status) = q.status {
            stmt.and_where(Expr::col(Invoices::Status).eq(status.as_str()));
        }
    }

    select
        .order_by(Invoices::Date, Order::Desc)
        .order_by(Invoices::Id, Order::Desc)
        .limit(u64::from(window.per_page))
        .offset(window.offset());

    BuiltListQuery {
        count_query: count.build(SqliteQueryBuilder),
        select_query: select.build(SqliteQueryBuilder),
        page: window.page,
        per_page: window.per_page,
    }
}

pub fn update_invoice(id: i64, req: &UpdateInvoiceRequest) -> Built {
    let mut changes = Changes::new(Invoices::Table);
    changes
        .set(Invoices::UpdatedAt, now())
        .set_opt(Invoices::Date, req.date.map(date))
        .set_opt(Invoices::DueDate, req.due_date.map(date))
        .set_opt(Invoices::Discount, req.discount.map(money))
        .set_opt(Invoices::Note, req.note.as_deref());
    changes.build_always(Expr::col(Invoices::Id).eq(id))
}

pub fn set_invoice_status(id: i64, status: InvoiceStatus) -> Built {
    Query::update()
        .table(Invoices::Table)
        .value(Invoices::Status, status.as_str())
        .value(Invoices::UpdatedAt, now())
        .and_where(Expr::col(Invoices::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Invoices that count toward receivables: not archived, not draft, not
/// cancelled. Columns: id, client_id, due_date.
pub fn receivable_invoices(client_id: Option<i64>) -> Built {
    let mut q = Query::select()
        .columns([Invoices::Id, Invoices::ClientId, Invoices::DueDate])
        .from(Invoices::Table)
        .and_where(Expr::col(Invoices::ArchivedAt).is_null())
        .and_where(
            Expr::col(Invoices::Status).is_not_in([
                InvoiceStatus::Draft.as_str(),
                InvoiceStatus::Cancelled.as_str(),
            ]),
        )
        .to_owned();
    if let Some(client_id) = client_id {
        q.and_where(Expr::col(Invoices::ClientId).eq(client_id));
    }
    q.order_by(Invoices::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

// ── Line items ─────────────────────────────────────────────────────────────

/// Which document a line item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOwner {
    Invoice(i64),
    Quote(i64),
}

impl ItemOwner {
    fn filter(self) -> sea_query::SimpleExpr {
        match self {
            Self::Invoice(id) => Expr::col((InvoiceItems::Table, InvoiceItems::InvoiceId)).eq(id),
            Self::Quote(id) => Expr::col((InvoiceItems::Table, InvoiceItems::QuoteId)).eq(id),
        }
    }
}

/// Columns: id, product_id, name, description, quantity, price, discount,
/// tax_id, tax percent. Must match `item_from_row()`.
fn item_select() -> SelectStatement {
    Query::select()
        .column((InvoiceItems::Table, InvoiceItems::Id))
        .column((InvoiceItems::Table, InvoiceItems::ProductId))
        .column((InvoiceItems::Table, InvoiceItems::Name))
        .column((InvoiceItems::Table, InvoiceItems::Description))
        .column((InvoiceItems::Table, InvoiceItems::Quantity))
        .column((InvoiceItems::Table, InvoiceItems::Price))
        .column((InvoiceItems::Table, InvoiceItems::Discount))
        .column((InvoiceItems::Table, InvoiceItems::TaxId))
        .column((Taxes::Table, Taxes::Percent))
        .from(InvoiceItems::Table)
        .join(
            JoinType::LeftJoin,
            Taxes::Table,
            Expr::col((InvoiceItems::Table, InvoiceItems::TaxId)).equals((Taxes::Table, Taxes::Id)),
        )
        .to_owned()
}

pub fn list_items(owner: ItemOwner) -> Built {
    item_select()
        .and_where(owner.filter())
        .order_by((InvoiceItems::Table, InvoiceItems::Id), Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn get_item(owner: ItemOwner, item_id: i64) -> Built {
    item_select()
        .and_where(owner.filter())
        .and_where(Expr::col((InvoiceItems::Table, InvoiceItems::Id)).eq(item_id))
        .build(SqliteQueryBuilder)
}

/// A resolved line, ready to insert.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub product_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub discount: Decimal,
    pub tax_id: Option<i64>,
}

pub fn insert_item(owner: ItemOwner, item: &NewItem) -> Built {
    let (invoice_id, quote_id) = match owner {
        ItemOwner::Invoice(id) => (Some(id), None),
        ItemOwner::Quote(id) => (None, Some(id)),
    };
    Query::insert()
        .into_table(InvoiceItems::Table)
        .columns([
            InvoiceItems::InvoiceId,
            InvoiceItems::QuoteId,
            InvoiceItems::ProductId,
            InvoiceItems::Name,
            InvoiceItems::Description,
            InvoiceItems::Quantity,
            InvoiceItems::Price,
            InvoiceItems::Discount,
            InvoiceItems::TaxId,
        ])
        .values_panic([
            invoice_id.into(),
            quote_id.into(),
            item.product_id.into(),
            item.name.as_str().into(),
            opt_text(item.description.as_deref()).into(),
            money(item.quantity).into(),
            money(item.price).into(),
            money(item.discount).into(),
            item.tax_id.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Overwrite every editable field of a line.
pub fn update_item(item_id: i64, item: &NewItem) -> Built {
    Query::update()
        .table(InvoiceItems::Table)
        .value(InvoiceItems::Name, item.name.as_str())
        .value(InvoiceItems::Description, opt_text(item.description.as_deref()))
        .value(InvoiceItems::Quantity, money(item.quantity))
        .value(InvoiceItems::Price, money(item.price))
        .value(InvoiceItems::Discount, money(item.discount))
        .value(InvoiceItems::TaxId, item.tax_id)
        .and_where(Expr::col(InvoiceItems::Id).eq(item_id))
        .build(SqliteQueryBuilder)
}

pub fn delete_item(item_id: i64) -> Built {
    Query::delete()
        .from_table(InvoiceItems::Table)
        .and_where(Expr::col(InvoiceItems::Id).eq(item_id))
        .build(SqliteQueryBuilder)
}

// ── Payments ───────────────────────────────────────────────────────────────

/// Columns: id, invoice_id, account_id, date, amount, method, reference,
/// created_at. Must match `payment_from_row()`.
fn payment_select() -> SelectStatement {
    Query::select()
        .columns([
            Payments::Id,
            Payments::InvoiceId,
            Payments::AccountId,
            Payments::Date,
            Payments::Amount,
            Payments::Method,
            Payments::Reference,
            Payments::CreatedAt,
        ])
        .from(Payments::Table)
        .to_owned()
}

pub fn list_payments(invoice_id: i64) -> Built {
    payment_select()
        .and_where(Expr::col(Payments::InvoiceId).eq(invoice_id))
        .order_by(Payments::Date, Order::Asc)
        .order_by(Payments::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn get_payment(invoice_id: i64, id: i64) -> Built {
    payment_select()
        .and_where(Expr::col(Payments::Id).eq(id))
        .and_where(Expr::col(Payments::InvoiceId).eq(invoice_id))
        .build(SqliteQueryBuilder)
}

/// Amounts only, for summing in decimal.
pub fn payment_amounts(invoice_id: i64) -> Built {
    Query::select()
        .column(Payments::Amount)
        .from(Payments::Table)
        .and_where(Expr::col(Payments::InvoiceId).eq(invoice_id))
        .build(SqliteQueryBuilder)
}

/// Amounts deposited to a bank account.
pub fn account_payment_amounts(account_id: i64) -> Built {
    Query::select()
        .column(Payments::Amount)
        .from(Payments::Table)
        .and_where(Expr::col(Payments::AccountId).eq(account_id))
        .build(SqliteQueryBuilder)
}

/// Parameters for recording a payment.
pub struct NewPayment<'a> {
    pub invoice_id: i64,
    pub account_id: Option<i64>,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub method: Option<PaymentMethod>,
    pub reference: Option<&'a str>,
}

pub fn insert_payment(p: &NewPayment<'_>) -> Built {
    Query::insert()
        .into_table(Payments::Table)
        .columns([
            Payments::InvoiceId,
            Payments::AccountId,
            Payments::Date,
            Payments::Amount,
            Payments::Method,
            Payments::Reference,
        ])
        .values_panic([
            p.invoice_id.into(),
            p.account_id.into(),
            date(p.date).into(),
            money(p.amount).into(),
            opt_text(p.method.map(|m| m.as_str())).into(),
            opt_text(p.reference).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn delete_payment(id: i64) -> Built {
    Query::delete()
        .from_table(Payments::Table)
        .and_where(Expr::col(Payments::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Quotes ─────────────────────────────────────────────────────────────────

/// Columns: id, client_id, prefix, number, status, date, expire_date,
/// discount, note, invoice_id, created_at, archived_at. Must match
/// `quote_from_row()`.
fn quote_select() -> SelectStatement {
    Query::select()
        .columns([
            Quotes::Id,
            Quotes::ClientId,
            Quotes::Prefix,
            Quotes::Number,
            Quotes::Status,
            Quotes::Date,
            Quotes::ExpireDate,
            Quotes::Discount,
            Quotes::Note,
            Quotes::InvoiceId,
            Quotes::CreatedAt,
            Quotes::ArchivedAt,
        ])
        .from(Quotes::Table)
        .to_owned()
}

pub fn get_quote(id: i64) -> Built {
    quote_select()
        .and_where(Expr::col(Quotes::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn max_quote_number(prefix: &str) -> Built {
    Query::select()
        .expr(Func::max(Expr::col(Quotes::Number)))
        .from(Quotes::Table)
        .and_where(Expr::col(Quotes::Prefix).eq(prefix))
        .build(SqliteQueryBuilder)
}

pub struct NewQuote<'a> {
    pub client_id: i64,
    pub prefix: &'a str,
    pub number: i64,
    pub date: NaiveDate,
    pub expire_date: Option<NaiveDate>,
    pub discount: Decimal,
    pub note: Option<&'a str>,
}

pub fn insert_quote(p: &NewQuote<'_>) -> Built {
    Query::insert()
        .into_table(Quotes::Table)
        .columns([
            Quotes::ClientId,
            Quotes::Prefix,
            Quotes::Number,
            Quotes::Date,
            Quotes::ExpireDate,
            Quotes::Discount,
            Quotes::Note,
        ])
        .values_panic([
            p.client_id.into(),
            p.prefix.into(),
            p.number.into(),
            date(p.date).into(),
            opt_date(p.expire_date).into(),
            money(p.discount).into(),
            opt_text(p.note).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn list_quotes(q: &QuoteListQuery) -> Built {
    let mut select = quote_select()
        .and_where(archived_filter(Quotes::ArchivedAt, q.archived))
        .to_owned();
    if let Some(client_id) = q.client_id {
        select.and_where(Expr::col(Quotes::ClientId).eq(client_id));
    }
    if let Some(status) = q.status {
        select.and_where(Expr::col(Quotes::Status).eq(status.as_str()));
    }
    select
        .order_by(Quotes::Date, Order::Desc)
        .order_by(Quotes::Id, Order::Desc)
        .build(SqliteQueryBuilder)
}

pub fn set_quote_status(id: i64, status: QuoteStatus) -> Built {
    Query::update()
        .table(Quotes::Table)
        .value(Quotes::Status, status.as_str())
        .and_where(Expr::col(Quotes::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Link a quote to the invoice it became. Only matches a quote that has not
/// been converted yet, so a second conversion updates zero rows.
pub fn mark_quote_invoiced(id: i64, invoice_id: i64) -> Built {
    Query::update()
        .table(Quotes::Table)
        .value(Quotes::Status, QuoteStatus::Invoiced.as_str())
        .value(Quotes::InvoiceId, invoice_id)
        .and_where(Expr::col(Quotes::Id).eq(id))
        .and_where(Expr::col(Quotes::InvoiceId).is_null())
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_join_tax_percent() {
        let (sql, values) = list_items(ItemOwner::Invoice(5));
        assert!(sql.contains(r#"LEFT JOIN "taxes" ON "invoice_items"."tax_id" = "taxes"."id""#));
        assert!(sql.contains(r#""invoice_items"."invoice_id" = ?"#));
        assert_eq!(values.0, vec![sea_query::Value::from(5i64)]);

        let (sql, _) = list_items(ItemOwner::Quote(5));
        assert!(sql.contains(r#""invoice_items"."quote_id" = ?"#));
    }

    #[test]
    fn item_insert_sets_exactly_one_owner() {
        let item = NewItem {
            product_id: None,
            name: "Labor".into(),
            description: None,
            quantity: Decimal::ONE,
            price: Decimal::TEN,
            discount: Decimal::ZERO,
            tax_id: None,
        };
        let (_, values) = insert_item(ItemOwner::Quote(9), &item);
        assert_eq!(values.0[0], sea_query::Value::BigInt(None));
        assert_eq!(values.0[1], sea_query::Value::from(9i64));
    }

    #[test]
    fn invoice_list_applies_filters_to_both_queries() {
        let q = InvoiceListQuery {
            client_id: Some(3),
            status: Some(InvoiceStatus::Sent),
            ..Default::default()
        };
        let built = list_invoices(&q, PageWindow::new(None, None));
        for (sql, _) in [&built.count_query, &built.select_query] {
            assert!(sql.contains(r#""client_id" = ?"#));
            assert!(sql.contains(r#""status" = ?"#));
            assert!(sql.contains(r#""archived_at" IS NULL"#));
        }
    }

    #[test]
    fn receivables_exclude_drafts_and_cancelled() {
        let (sql, values) = receivable_invoices(Some(1));
        assert!(sql.contains(r#""status" NOT IN (?, ?)"#));
        assert_eq!(values.0.len(), 3);
    }

    #[test]
    fn conversion_guard() {
        let (sql, _) = mark_quote_invoiced(1, 2);
        assert!(sql.ends_with(r#"AND "invoice_id" IS NULL"#));
    }
}
