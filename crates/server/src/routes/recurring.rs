use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use rust_decimal::Decimal;

use ledgerdesk_api::db::recurring::{self, NewRecurring};
use ledgerdesk_api::db::clients;
use ledgerdesk_api::service;
use ledgerdesk_api::{
    CreateRecurringRequest, CreateSubscriptionRequest, ImportRecurringResponse,
    ListRecurringResponse, ListSubscriptionsResponse, OkResponse, ProcessRecurringResponse,
    RecurringListQuery, RecurringResponse, RecurringStatus, RowError, SubscriptionResponse,
    UpcomingQuery, UpcomingResponse, UpdateRecurringRequest,
};
use ledgerdesk_core::import::parse_recurring_csv;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::catalog::find_product;
use crate::routes::clients::require_client;
use crate::routes::found;
use crate::storage::{
    Db, recurring_from_row, schedule_of, sq_execute, sq_find, sq_insert,
    sq_query_map, subscription_from_row,
};

const MAX_UPCOMING: u32 = 120;

fn require_recurring(conn: &Connection, id: i64) -> Result<RecurringResponse, ApiErr> {
    let rec = sq_find(conn, recurring::get(id), recurring_from_row)
        .map_err(ApiErr::from_db("get recurring payment"))?;
    found(rec, "recurring payment")
}

/// `0` means no limit.
fn occurrence_limit(occurrences: Option<u32>) -> Option<u32> {
    occurrences.filter(|n| *n > 0)
}

// ---------------------------------------------------------------------------
// Recurring payments
// ---------------------------------------------------------------------------

/// POST /api/recurring
pub async fn create_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateRecurringRequest>,
) -> Result<(StatusCode, Json<RecurringResponse>), ApiErr> {
    let amount = service::validate_positive("amount", req.amount)?;
    let description = service::optional_text(req.description);
    let conn = db.conn();
    require_client(&conn, req.client_id)
        .map_err(|_| ApiErr::bad_request(format!("unknown client {}", req.client_id)))?;
    let id = sq_insert(
        &conn,
        recurring::insert(&NewRecurring {
            client_id: req.client_id,
            amount,
            frequency: req.frequency,
            start_date: req.start_date,
            occurrences: occurrence_limit(req.occurrences),
            method: req.method,
            description: description.as_deref(),
        }),
    )
    .map_err(ApiErr::from_db("insert recurring payment"))?;
    tracing::info!(recurring_id = id, client_id = req.client_id, frequency = %req.frequency, "recurring payment created");
    Ok((StatusCode::CREATED, Json(require_recurring(&conn, id)?)))
}

/// GET /api/recurring
pub async fn list_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<RecurringListQuery>,
) -> Result<Json<ListRecurringResponse>, ApiErr> {
    let conn = db.conn();
    let recurring_payments = sq_query_map(&conn, recurring::list(&q), recurring_from_row)
        .map_err(ApiErr::from_db("list recurring payments"))?;
    Ok(Json(ListRecurringResponse { recurring_payments }))
}

/// GET /api/recurring/{id} - includes next date and remaining occurrences.
pub async fn get_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecurringResponse>, ApiErr> {
    let conn = db.conn();
    Ok(Json(require_recurring(&conn, id)?))
}

/// PUT /api/recurring/{id}
///
/// Changing the limit can complete an active schedule or reopen a completed
/// one; cancelled schedules stay cancelled.
pub async fn update_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRecurringRequest>,
) -> Result<Json<RecurringResponse>, ApiErr> {
    let req = UpdateRecurringRequest {
        amount: req
            .amount
            .map(|a| service::validate_positive("amount", a))
            .transpose()?,
        description: req.description.map(|d| d.trim().to_string()),
        ..req
    };
    let conn = db.conn();
    let before = require_recurring(&conn, id)?;
    if before.status == RecurringStatus::Cancelled {
        return Err(ApiErr::conflict("recurring payment is cancelled"));
    }
    if let Some(update) = recurring::update(id, &req) {
        sq_execute(&conn, update).map_err(ApiErr::from_db("update recurring payment"))?;
    }

    let after = require_recurring(&conn, id)?;
    let complete = schedule_of(&after).is_complete();
    let status = match (after.status, complete) {
        (RecurringStatus::Active, true) => Some(RecurringStatus::Completed),
        (RecurringStatus::Completed, false) => Some(RecurringStatus::Active),
        _ => None,
    };
    if let Some(status) = status {
        sq_execute(&conn, recurring::set_status(id, status))
            .map_err(ApiErr::from_db("set recurring status"))?;
        return Ok(Json(require_recurring(&conn, id)?));
    }
    Ok(Json(after))
}

/// GET /api/recurring/{id}/upcoming?count=12
pub async fn upcoming_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Query(q): Query<UpcomingQuery>,
) -> Result<Json<UpcomingResponse>, ApiErr> {
    let conn = db.conn();
    let rec = require_recurring(&conn, id)?;
    let dates = if rec.status == RecurringStatus::Active {
        schedule_of(&rec).upcoming(q.count.unwrap_or(12).clamp(1, MAX_UPCOMING))
    } else {
        Vec::new()
    };
    Ok(Json(UpcomingResponse { id, dates }))
}

/// POST /api/recurring/{id}/process - process the next occurrence.
pub async fn process_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProcessRecurringResponse>, ApiErr> {
    let conn = db.conn();
    let rec = require_recurring(&conn, id)?;
    if rec.status != RecurringStatus::Active {
        return Err(ApiErr::conflict(format!("recurring payment is {}", rec.status)));
    }
    let mut schedule = schedule_of(&rec);
    let processed_date = schedule
        .advance()
        .ok_or_else(|| ApiErr::conflict("no occurrences left to process"))?;
    let status = if schedule.is_complete() {
        RecurringStatus::Completed
    } else {
        RecurringStatus::Active
    };

    let changed = sq_execute(&conn, recurring::record_processed(id, rec.completed, status))
        .map_err(ApiErr::from_db("record processed occurrence"))?;
    if changed == 0 {
        return Err(ApiErr::conflict("occurrence was processed concurrently"));
    }
    tracing::info!(recurring_id = id, date = %processed_date, status = %status, "recurring occurrence processed");

    Ok(Json(ProcessRecurringResponse {
        processed_date,
        recurring: require_recurring(&conn, id)?,
    }))
}

/// POST /api/recurring/{id}/cancel
pub async fn cancel_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecurringResponse>, ApiErr> {
    let conn = db.conn();
    let rec = require_recurring(&conn, id)?;
    if rec.status == RecurringStatus::Completed {
        return Err(ApiErr::conflict("recurring payment already completed"));
    }
    sq_execute(&conn, recurring::set_status(id, RecurringStatus::Cancelled))
        .map_err(ApiErr::from_db("cancel recurring payment"))?;
    Ok(Json(require_recurring(&conn, id)?))
}

fn import_rows(conn: &mut Connection, body: &[u8]) -> Result<Vec<i64>, ApiErr> {
    let outcome = parse_recurring_csv(body)?;
    if !outcome.is_clean() {
        return Err(ApiErr::rejected_rows("import rejected", outcome.errors));
    }
    if outcome.rows.is_empty() {
        return Err(ApiErr::bad_request("import file has no rows"));
    }

    let mut by_name: HashMap<String, i64> = HashMap::new();
    let active = sq_query_map(conn, clients::active_names(), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })
    .map_err(ApiErr::from_db("list client names"))?;
    for (id, name) in active {
        by_name.entry(clients::name_key(&name)).or_insert(id);
    }

    let mut client_ids = Vec::with_capacity(outcome.rows.len());
    let mut errors = Vec::new();
    for row in &outcome.rows {
        match by_name.get(&clients::name_key(&row.client)) {
            Some(id) => client_ids.push(*id),
            None => errors.push(RowError::new(row.row, format!("unknown client '{}'", row.client))),
        }
    }
    if !errors.is_empty() {
        return Err(ApiErr::rejected_rows("import rejected", errors));
    }

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let mut ids = Vec::with_capacity(outcome.rows.len());
    for (row, client_id) in outcome.rows.iter().zip(client_ids) {
        let id = sq_insert(
            &tx,
            recurring::insert(&NewRecurring {
                client_id,
                amount: row.amount,
                frequency: row.frequency,
                start_date: row.start_date,
                occurrences: occurrence_limit(row.occurrences),
                method: row.method,
                description: row.description.as_deref(),
            }),
        )
        .map_err(ApiErr::from_db("insert imported recurring payment"))?;
        ids.push(id);
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    Ok(ids)
}

/// POST /api/recurring/import - CSV upload. Either every row is imported or
/// none is.
pub async fn import_recurring(
    State(db): State<Db>,
    _auth: AuthUser,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportRecurringResponse>), ApiErr> {
    let ids = {
        let mut conn = db.conn();
        import_rows(&mut conn, &body)?
    };
    tracing::info!(imported = ids.len(), "recurring payments imported");
    Ok((
        StatusCode::CREATED,
        Json(ImportRecurringResponse {
            imported: ids.len(),
            ids,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

fn client_subscriptions(conn: &Connection, client_id: i64) -> Result<Vec<SubscriptionResponse>, ApiErr> {
    sq_query_map(conn, recurring::list_subscriptions(client_id), subscription_from_row)
        .map_err(ApiErr::from_db("list subscriptions"))
}

/// POST /api/clients/{id}/subscriptions
pub async fn create_subscription(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiErr> {
    let quantity = service::validate_positive("quantity", req.quantity.unwrap_or(Decimal::ONE))?;
    let conn = db.conn();
    require_client(&conn, client_id)?;
    if find_product(&conn, req.product_id)?.is_none() {
        return Err(ApiErr::bad_request(format!("unknown product {}", req.product_id)));
    }
    let id = sq_insert(&conn, recurring::insert_subscription(client_id, req.product_id, quantity))
        .map_err(ApiErr::from_db("insert subscription"))?;
    let subscription = client_subscriptions(&conn, client_id)?
        .into_iter()
        .find(|s| s.id == id);
    Ok((StatusCode::CREATED, Json(found(subscription, "subscription")?)))
}

/// GET /api/clients/{id}/subscriptions - with the combined monthly amount.
pub async fn list_subscriptions(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
) -> Result<Json<ListSubscriptionsResponse>, ApiErr> {
    let conn = db.conn();
    require_client(&conn, client_id)?;
    let subscriptions = client_subscriptions(&conn, client_id)?;
    let monthly_total = subscriptions.iter().map(|s| s.monthly_amount).sum();
    Ok(Json(ListSubscriptionsResponse {
        subscriptions,
        monthly_total,
    }))
}

/// DELETE /api/clients/{id}/subscriptions/{subscription_id}
pub async fn delete_subscription(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<OkResponse>, ApiErr> {
    let conn = db.conn();
    let deleted = sq_execute(&conn, recurring::delete_subscription(client_id, id))
        .map_err(ApiErr::from_db("delete subscription"))?;
    if deleted == 0 {
        return Err(ApiErr::not_found("subscription not found"));
    }
    Ok(Json(OkResponse { ok: true }))
}
