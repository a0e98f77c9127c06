use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use ledgerdesk_api::db::{banking, billing, catalog};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    AccountDetailResponse, AccountResponse, ArchivedQuery, CreateAccountRequest,
    CreateTransactionRequest, ListAccountsResponse, ListTransactionsResponse,
    PlaidExchangeRequest, PlaidExchangeResponse, PlaidSyncResponse, TransactionListQuery,
    TransactionResponse, UpdateTransactionRequest,
};

use crate::error::ApiErr;
use crate::plaid::{PlaidClient, SyncBatch};
use crate::routes::auth::AuthUser;
use crate::routes::found;
use crate::storage::{
    Db, account_from_row, category_from_row, sq_execute, sq_find, sq_insert, sq_query_map,
    sum_decimals, transaction_from_row,
};

const DEFAULT_CURRENCY: &str = "USD";

fn require_account(conn: &Connection, id: i64) -> Result<AccountResponse, ApiErr> {
    let account = sq_find(conn, banking::get_account(id), account_from_row)
        .map_err(ApiErr::from_db("get account"))?;
    found(account, "account")
}

fn require_transaction(conn: &Connection, id: i64) -> Result<TransactionResponse, ApiErr> {
    let tx = sq_find(conn, banking::get_transaction(id), transaction_from_row)
        .map_err(ApiErr::from_db("get transaction"))?;
    found(tx, "transaction")
}

fn check_category(conn: &Connection, category_id: Option<i64>) -> Result<(), ApiErr> {
    if let Some(category_id) = category_id {
        let category = sq_find(conn, catalog::get_category(category_id), category_from_row)
            .map_err(ApiErr::from_db("get category"))?;
        if category.is_none() {
            return Err(ApiErr::bad_request(format!("unknown category {category_id}")));
        }
    }
    Ok(())
}

fn currency_code(currency: Option<String>) -> Result<String, ApiErr> {
    let Some(code) = service::optional_text(currency) else {
        return Ok(DEFAULT_CURRENCY.to_string());
    };
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiErr::bad_request("currency must be a 3-letter code"));
    }
    Ok(code.to_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// POST /api/accounts
pub async fn create_account(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiErr> {
    let currency = currency_code(req.currency.clone())?;
    let req = CreateAccountRequest {
        name: service::validate_name("name", &req.name, 100)?,
        account_type: service::optional_text(req.account_type),
        ..req
    };
    let conn = db.conn();
    let id = sq_insert(&conn, banking::insert_account(&req, &currency))
        .map_err(ApiErr::from_db("insert account"))?;
    tracing::info!(account_id = id, "bank account created");
    Ok((StatusCode::CREATED, Json(require_account(&conn, id)?)))
}

/// GET /api/accounts
pub async fn list_accounts(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListAccountsResponse>, ApiErr> {
    let conn = db.conn();
    let accounts = sq_query_map(&conn, banking::list_accounts(q.archived), account_from_row)
        .map_err(ApiErr::from_db("list accounts"))?;
    Ok(Json(ListAccountsResponse { accounts }))
}

/// GET /api/accounts/{id} - balance is the opening balance plus payments
/// received into the account.
pub async fn get_account(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AccountDetailResponse>, ApiErr> {
    let conn = db.conn();
    let account = require_account(&conn, id)?;
    let payments_received = sum_decimals(&conn, billing::account_payment_amounts(id))
        .map_err(ApiErr::from_db("account payments"))?;
    Ok(Json(AccountDetailResponse {
        balance: account.opening_balance + payments_received,
        account,
        payments_received,
    }))
}

// ---------------------------------------------------------------------------
// Plaid
// ---------------------------------------------------------------------------

/// POST /api/accounts/{id}/plaid/exchange - link the account to a Plaid item.
pub async fn plaid_exchange(
    State(db): State<Db>,
    State(plaid): State<PlaidClient>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<PlaidExchangeRequest>,
) -> Result<Json<PlaidExchangeResponse>, ApiErr> {
    auth.require_admin()?;
    let public_token = req.public_token.trim();
    if public_token.is_empty() {
        return Err(ApiErr::bad_request("public_token is required"));
    }
    {
        let conn = db.conn();
        require_account(&conn, id)?;
    }

    let exchange = plaid.exchange_public_token(public_token).await?;
    let plaid_account_id = service::optional_text(req.plaid_account_id);
    {
        let conn = db.conn();
        sq_execute(
            &conn,
            banking::set_plaid_link(
                id,
                &exchange.item_id,
                &exchange.access_token,
                plaid_account_id.as_deref(),
            ),
        )
        .map_err(ApiErr::from_db("store plaid link"))?;
    }
    tracing::info!(account_id = id, item_id = %exchange.item_id, "account linked to plaid");
    Ok(Json(PlaidExchangeResponse {
        account_id: id,
        item_id: exchange.item_id,
    }))
}

fn apply_sync(conn: &mut Connection, account_id: i64, batch: &SyncBatch) -> Result<PlaidSyncResponse, ApiErr> {
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let mut outcome = PlaidSyncResponse::default();
    for (txn, counter) in batch
        .added
        .iter()
        .map(|t| (t, true))
        .chain(batch.modified.iter().map(|t| (t, false)))
    {
        sq_execute(
            &tx,
            banking::upsert_plaid_transaction(
                account_id,
                &txn.transaction_id,
                txn.date,
                &txn.name,
                txn.local_amount(),
            ),
        )
        .map_err(ApiErr::from_db("upsert plaid transaction"))?;
        if counter {
            outcome.added += 1;
        } else {
            outcome.modified += 1;
        }
    }
    for removed in &batch.removed {
        let n = sq_execute(
            &tx,
            banking::delete_plaid_transaction(account_id, &removed.transaction_id),
        )
        .map_err(ApiErr::from_db("delete plaid transaction"))?;
        outcome.removed += n as u32;
    }
    if let Some(cursor) = &batch.next_cursor {
        sq_execute(&tx, banking::set_plaid_cursor(account_id, cursor))
            .map_err(ApiErr::from_db("store plaid cursor"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    outcome.cursor = batch.next_cursor.clone();
    Ok(outcome)
}

/// POST /api/accounts/{id}/plaid/sync - pull changes since the stored cursor.
pub async fn plaid_sync(
    State(db): State<Db>,
    State(plaid): State<PlaidClient>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PlaidSyncResponse>, ApiErr> {
    let (access_token, plaid_account_id, cursor) = {
        let conn = db.conn();
        require_account(&conn, id)?;
        sq_find(&conn, banking::plaid_link(id), |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(ApiErr::from_db("plaid link"))?
        .unwrap_or_default()
    };
    let access_token =
        access_token.ok_or_else(|| ApiErr::conflict("account is not linked to Plaid"))?;

    let mut batch = plaid.sync_transactions(&access_token, cursor.as_deref()).await?;
    if let Some(plaid_account_id) = &plaid_account_id {
        batch.retain_account(plaid_account_id);
    }

    let outcome = {
        let mut conn = db.conn();
        apply_sync(&mut conn, id, &batch)?
    };
    tracing::info!(
        account_id = id,
        added = outcome.added,
        modified = outcome.modified,
        removed = outcome.removed,
        "plaid sync finished"
    );
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// POST /api/accounts/{id}/transactions - record a transaction by hand.
pub async fn create_transaction(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(account_id): Path<i64>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiErr> {
    let name = service::validate_name("name", &req.name, 200)?;
    let conn = db.conn();
    require_account(&conn, account_id)?;
    check_category(&conn, req.category_id)?;
    let id = sq_insert(
        &conn,
        banking::insert_transaction(account_id, req.date, &name, req.amount, req.category_id),
    )
    .map_err(ApiErr::from_db("insert transaction"))?;
    Ok((StatusCode::CREATED, Json(require_transaction(&conn, id)?)))
}

/// GET /api/accounts/{id}/transactions?unreconciled=true
pub async fn list_transactions(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(account_id): Path<i64>,
    Query(q): Query<TransactionListQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiErr> {
    let conn = db.conn();
    require_account(&conn, account_id)?;
    let transactions = sq_query_map(
        &conn,
        banking::list_transactions(account_id, q.unreconciled),
        transaction_from_row,
    )
    .map_err(ApiErr::from_db("list transactions"))?;
    Ok(Json(ListTransactionsResponse { transactions }))
}

/// PUT /api/transactions/{id} - categorize, reconcile or match to a payment.
pub async fn update_transaction(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTransactionRequest>,
) -> Result<Json<TransactionResponse>, ApiErr> {
    let conn = db.conn();
    require_transaction(&conn, id)?;
    check_category(&conn, req.category_id)?;
    if let Some(update) = banking::update_transaction(id, &req) {
        sq_execute(&conn, update)
            .map_err(ApiErr::from_write("update transaction", "unknown payment"))?;
    }
    Ok(Json(require_transaction(&conn, id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::plaid::{PlaidTransaction, RemovedTransaction};
    use crate::storage::init_db;

    fn plaid_txn(id: &str, amount: &str, name: &str) -> PlaidTransaction {
        PlaidTransaction {
            transaction_id: id.to_string(),
            account_id: "acc-1".to_string(),
            amount: amount.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            name: name.to_string(),
        }
    }

    fn by_plaid_id(conn: &Connection, account_id: i64, plaid_id: &str) -> Option<TransactionResponse> {
        sq_query_map(conn, banking::list_transactions(account_id, false), transaction_from_row)
            .unwrap()
            .into_iter()
            .find(|t| t.plaid_transaction_id.as_deref() == Some(plaid_id))
    }

    #[test]
    fn resync_keeps_local_state_and_drops_removed() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let mut conn = db.conn();
        conn.execute("INSERT INTO accounts (name) VALUES ('Operating')", [])
            .unwrap();
        let account_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO categories (name, category_type) VALUES ('Software', 'expense')",
            [],
        )
        .unwrap();
        let category_id = conn.last_insert_rowid();

        let first = SyncBatch {
            added: vec![
                plaid_txn("tx-1", "42.50", "Cloud hosting"),
                plaid_txn("tx-2", "-1000", "Client deposit"),
            ],
            next_cursor: Some("c1".to_string()),
            ..Default::default()
        };
        let outcome = apply_sync(&mut conn, account_id, &first).unwrap();
        assert_eq!((outcome.added, outcome.modified, outcome.removed), (2, 0, 0));
        assert_eq!(outcome.cursor.as_deref(), Some("c1"));

        let hosting = by_plaid_id(&conn, account_id, "tx-1").unwrap();
        assert_eq!(hosting.amount, "-42.50".parse::<Decimal>().unwrap());
        let update = UpdateTransactionRequest {
            category_id: Some(category_id),
            reconciled: Some(true),
            payment_id: None,
        };
        sq_execute(&conn, banking::update_transaction(hosting.id, &update).unwrap()).unwrap();

        let second = SyncBatch {
            modified: vec![plaid_txn("tx-1", "45", "Cloud hosting (final)")],
            removed: vec![RemovedTransaction {
                transaction_id: "tx-2".to_string(),
                account_id: None,
            }],
            next_cursor: Some("c2".to_string()),
            ..Default::default()
        };
        let outcome = apply_sync(&mut conn, account_id, &second).unwrap();
        assert_eq!((outcome.added, outcome.modified, outcome.removed), (0, 1, 1));

        let hosting = by_plaid_id(&conn, account_id, "tx-1").unwrap();
        assert_eq!(hosting.name, "Cloud hosting (final)");
        assert_eq!(hosting.amount, Decimal::from(-45));
        assert_eq!(hosting.category_id, Some(category_id));
        assert!(hosting.reconciled);
        assert!(by_plaid_id(&conn, account_id, "tx-2").is_none());

        let (_, _, cursor) = sq_find(&conn, banking::plaid_link(account_id), |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .unwrap()
        .unwrap();
        assert_eq!(cursor.as_deref(), Some("c2"));
    }
}
