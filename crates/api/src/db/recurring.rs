//! Recurring payments and product subscriptions.

use sea_query::{Expr, JoinType, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::{Products, RecurringPayments, Subscriptions};
use super::{Built, Changes, date, money, now, opt_text};
use crate::{PaymentMethod, RecurringListQuery, RecurringStatus, UpdateRecurringRequest};
use ledgerdesk_core::recurring::Frequency;

// ── Recurring payments ─────────────────────────────────────────────────────

/// Columns: id, client_id, amount, frequency, start_date, occurrences,
/// completed, method, description, status, last_processed_at, created_at.
/// Must match `recurring_from_row()`.
fn recurring_select() -> SelectStatement {
    Query::select()
        .columns([
            RecurringPayments::Id,
            RecurringPayments::ClientId,
            RecurringPayments::Amount,
            RecurringPayments::Frequency,
            RecurringPayments::StartDate,
            RecurringPayments::Occurrences,
            RecurringPayments::Completed,
            RecurringPayments::Method,
            RecurringPayments::Description,
            RecurringPayments::Status,
            RecurringPayments::LastProcessedAt,
            RecurringPayments::CreatedAt,
        ])
        .from(RecurringPayments::Table)
        .to_owned()
}

pub fn get(id: i64) -> Built {
    recurring_select()
        .and_where(Expr::col(RecurringPayments::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list(q: &RecurringListQuery) -> Built {
    let mut select = recurring_select();
    if let Some(client_id) = q.client_id {
        select.and_where(Expr::col(RecurringPayments::ClientId).eq(client_id));
    }
    if let Some(status) = q.status {
        select.and_where(Expr::col(RecurringPayments::Status).eq(status.as_str()));
    }
    select
        .order_by(RecurringPayments::StartDate, Order::Asc)
        .order_by(RecurringPayments::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Parameters for a new schedule. `occurrences` of `None` is unlimited.
pub struct NewRecurring<'a> {
    pub client_id: i64,
    pub amount: rust_decimal::Decimal,
    pub frequency: Frequency,
    pub start_date: chrono::NaiveDate,
    pub occurrences: Option<u32>,
    pub method: Option<PaymentMethod>,
    pub description: Option<&'a str>,
}

pub fn insert(p: &NewRecurring<'_>) -> Built {
    Query::insert()
        .into_table(RecurringPayments::Table)
        .columns([
            RecurringPayments::ClientId,
            RecurringPayments::Amount,
            RecurringPayments::Frequency,
            RecurringPayments::StartDate,
            RecurringPayments::Occurrences,
            RecurringPayments::Method,
            RecurringPayments::Description,
        ])
        .values_panic([
            p.client_id.into(),
            money(p.amount).into(),
            p.frequency.as_str().into(),
            date(p.start_date).into(),
            p.occurrences.into(),
            opt_text(p.method.map(|m| m.as_str())).into(),
            opt_text(p.description).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// `occurrences` of `Some(0)` clears the limit.
pub fn update(id: i64, req: &UpdateRecurringRequest) -> Option<Built> {
    let mut changes = Changes::new(RecurringPayments::Table);
    changes
        .set_opt(RecurringPayments::Amount, req.amount.map(money))
        .set_opt(RecurringPayments::Frequency, req.frequency.map(|f| f.as_str()))
        .set_opt(
            RecurringPayments::Occurrences,
            req.occurrences.map(|n| if n == 0 { None } else { Some(n) }),
        )
        .set_opt(RecurringPayments::Method, req.method.map(|m| m.as_str()))
        .set_opt(RecurringPayments::Description, req.description.as_deref());
    changes.build(Expr::col(RecurringPayments::Id).eq(id))
}

/// Record one processed occurrence. Guarded on the previous count so two
/// concurrent calls cannot both advance the same occurrence.
pub fn record_processed(id: i64, previous: u32, status: RecurringStatus) -> Built {
    Query::update()
        .table(RecurringPayments::Table)
        .value(RecurringPayments::Completed, previous + 1)
        .value(RecurringPayments::Status, status.as_str())
        .value(RecurringPayments::LastProcessedAt, now())
        .and_where(Expr::col(RecurringPayments::Id).eq(id))
        .and_where(Expr::col(RecurringPayments::Completed).eq(previous))
        .build(SqliteQueryBuilder)
}

pub fn set_status(id: i64, status: RecurringStatus) -> Built {
    Query::update()
        .table(RecurringPayments::Table)
        .value(RecurringPayments::Status, status.as_str())
        .and_where(Expr::col(RecurringPayments::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Subscriptions ──────────────────────────────────────────────────────────

/// Columns: id, client_id, product_id, product name, quantity, product
/// price, created_at. Must match `subscription_from_row()`.
pub fn list_subscriptions(client_id: i64) -> Built {
    Query::select()
        .column((Subscriptions::Table, Subscriptions::Id))
        .column((Subscriptions::Table, Subscriptions::ClientId))
        .column((Subscriptions::Table, Subscriptions::ProductId))
        .column((Products::Table, Products::Name))
        .column((Subscriptions::Table, Subscriptions::Quantity))
        .column((Products::Table, Products::Price))
        .column((Subscriptions::Table, Subscriptions::CreatedAt))
        .from(Subscriptions::Table)
        .join(
            JoinType::InnerJoin,
            Products::Table,
            Expr::col((Subscriptions::Table, Subscriptions::ProductId))
                .equals((Products::Table, Products::Id)),
        )
        .and_where(Expr::col((Subscriptions::Table, Subscriptions::ClientId)).eq(client_id))
        .order_by((Subscriptions::Table, Subscriptions::Id), Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_subscription(client_id: i64, product_id: i64, quantity: rust_decimal::Decimal) -> Built {
    Query::insert()
        .into_table(Subscriptions::Table)
        .columns([
            Subscriptions::ClientId,
            Subscriptions::ProductId,
            Subscriptions::Quantity,
        ])
        .values_panic([client_id.into(), product_id.into(), money(quantity).into()])
        .build(SqliteQueryBuilder)
}

pub fn delete_subscription(client_id: i64, id: i64) -> Built {
    Query::delete()
        .from_table(Subscriptions::Table)
        .and_where(Expr::col(Subscriptions::Id).eq(id))
        .and_where(Expr::col(Subscriptions::ClientId).eq(client_id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_occurrences_clears_limit() {
        let req = UpdateRecurringRequest {
            occurrences: Some(0),
            ..Default::default()
        };
        let (sql, values) = update(1, &req).unwrap();
        assert_eq!(sql, r#"UPDATE "recurring_payments" SET "occurrences" = ? WHERE "id" = ?"#);
        assert_eq!(values.0[0], sea_query::Value::Unsigned(None));
    }

    #[test]
    fn processing_is_guarded_by_previous_count() {
        let (sql, values) = record_processed(4, 2, RecurringStatus::Active);
        assert!(sql.contains(r#""completed" = ?"#));
        assert!(sql.ends_with(r#"WHERE "id" = ? AND "completed" = ?"#));
        assert_eq!(values.0[0], sea_query::Value::from(3u32));
    }

    #[test]
    fn empty_update_is_none() {
        assert!(update(1, &UpdateRecurringRequest::default()).is_none());
    }
}
