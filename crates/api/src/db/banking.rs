//! Bank account and transaction query builders.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_query::{Expr, OnConflict, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::{Accounts, BankTransactions};
use super::{Built, Changes, archived_filter, date, money, opt_text};
use crate::{CreateAccountRequest, UpdateTransactionRequest};

// ── Accounts ───────────────────────────────────────────────────────────────

/// Columns: id, name, account_type, currency, opening_balance, linked flag,
/// created_at, archived_at. Must match `account_from_row()`.
fn account_select() -> SelectStatement {
    Query::select()
        .columns([
            Accounts::Id,
            Accounts::Name,
            Accounts::AccountType,
            Accounts::Currency,
            Accounts::OpeningBalance,
        ])
        .expr(Expr::col(Accounts::PlaidAccessToken).is_not_null())
        .columns([Accounts::CreatedAt, Accounts::ArchivedAt])
        .from(Accounts::Table)
        .to_owned()
}

pub fn get_account(id: i64) -> Built {
    account_select()
        .and_where(Expr::col(Accounts::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list_accounts(archived: bool) -> Built {
    account_select()
        .and_where(archived_filter(Accounts::ArchivedAt, archived))
        .order_by(Accounts::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_account(req: &CreateAccountRequest, currency: &str) -> Built {
    Query::insert()
        .into_table(Accounts::Table)
        .columns([
            Accounts::Name,
            Accounts::AccountType,
            Accounts::Currency,
            Accounts::OpeningBalance,
        ])
        .values_panic([
            req.name.as_str().into(),
            opt_text(req.account_type.as_deref()).into(),
            currency.into(),
            money(req.opening_balance.unwrap_or_default()).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Columns: plaid_access_token, plaid_account_id, plaid_cursor.
pub fn plaid_link(id: i64) -> Built {
    Query::select()
        .columns([
            Accounts::PlaidAccessToken,
            Accounts::PlaidAccountId,
            Accounts::PlaidCursor,
        ])
        .from(Accounts::Table)
        .and_where(Expr::col(Accounts::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Store a fresh Plaid link; the sync cursor starts over.
pub fn set_plaid_link(
    id: i64,
    item_id: &str,
    access_token: &str,
    plaid_account_id: Option<&str>,
) -> Built {
    Query::update()
        .table(Accounts::Table)
        .value(Accounts::PlaidItemId, item_id)
        .value(Accounts::PlaidAccessToken, access_token)
        .value(Accounts::PlaidAccountId, opt_text(plaid_account_id))
        .value(Accounts::PlaidCursor, Option::<String>::None)
        .and_where(Expr::col(Accounts::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn set_plaid_cursor(id: i64, cursor: &str) -> Built {
    Query::update()
        .table(Accounts::Table)
        .value(Accounts::PlaidCursor, cursor)
        .and_where(Expr::col(Accounts::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Transactions ───────────────────────────────────────────────────────────

/// Columns: id, account_id, plaid_transaction_id, date, name, amount,
/// category_id, reconciled, payment_id. Must match `transaction_from_row()`.
fn transaction_select() -> SelectStatement {
    Query::select()
        .columns([
            BankTransactions::Id,
            BankTransactions::AccountId,
            BankTransactions::PlaidTransactionId,
            BankTransactions::Date,
            BankTransactions::Name,
            BankTransactions::Amount,
            BankTransactions::CategoryId,
            BankTransactions::Reconciled,
            BankTransactions::PaymentId,
        ])
        .from(BankTransactions::Table)
        .to_owned()
}

pub fn get_transaction(id: i64) -> Built {
    transaction_select()
        .and_where(Expr::col(BankTransactions::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list_transactions(account_id: i64, unreconciled_only: bool) -> Built {
    let mut select = transaction_select()
        .and_where(Expr::col(BankTransactions::AccountId).eq(account_id))
        .to_owned();
    if unreconciled_only {
        select.and_where(Expr::col(BankTransactions::Reconciled).eq(false));
    }
    select
        .order_by(BankTransactions::Date, Order::Desc)
        .order_by(BankTransactions::Id, Order::Desc)
        .build(SqliteQueryBuilder)
}

pub fn insert_transaction(
    account_id: i64,
    day: NaiveDate,
    name: &str,
    amount: Decimal,
    category_id: Option<i64>,
) -> Built {
    Query::insert()
        .into_table(BankTransactions::Table)
        .columns([
            BankTransactions::AccountId,
            BankTransactions::Date,
            BankTransactions::Name,
            BankTransactions::Amount,
            BankTransactions::CategoryId,
        ])
        .values_panic([
            account_id.into(),
            date(day).into(),
            name.into(),
            money(amount).into(),
            category_id.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Insert or refresh a Plaid transaction by its Plaid id. Local
/// categorization and reconciliation survive the refresh.
pub fn upsert_plaid_transaction(
    account_id: i64,
    plaid_transaction_id: &str,
    day: NaiveDate,
    name: &str,
    amount: Decimal,
) -> Built {
    Query::insert()
        .into_table(BankTransactions::Table)
        .columns([
            BankTransactions::AccountId,
            BankTransactions::PlaidTransactionId,
            BankTransactions::Date,
            BankTransactions::Name,
            BankTransactions::Amount,
        ])
        .values_panic([
            account_id.into(),
            plaid_transaction_id.into(),
            date(day).into(),
            name.into(),
            money(amount).into(),
        ])
        .on_conflict(
            OnConflict::column(BankTransactions::PlaidTransactionId)
                .update_columns([
                    BankTransactions::Date,
                    BankTransactions::Name,
                    BankTransactions::Amount,
                ])
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

pub fn delete_plaid_transaction(account_id: i64, plaid_transaction_id: &str) -> Built {
    Query::delete()
        .from_table(BankTransactions::Table)
        .and_where(Expr::col(BankTransactions::AccountId).eq(account_id))
        .and_where(Expr::col(BankTransactions::PlaidTransactionId).eq(plaid_transaction_id))
        .build(SqliteQueryBuilder)
}

pub fn update_transaction(id: i64, req: &UpdateTransactionRequest) -> Option<Built> {
    let mut changes = Changes::new(BankTransactions::Table);
    changes
        .set_opt(BankTransactions::CategoryId, req.category_id)
        .set_opt(BankTransactions::Reconciled, req.reconciled)
        .set_opt(BankTransactions::PaymentId, req.payment_id);
    changes.build(Expr::col(BankTransactions::Id).eq(id))
}
