use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use ledgerdesk_api::db::billing::{self, ItemOwner, NewInvoice, NewItem, NewQuote};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    ConvertQuoteResponse, CreateQuoteRequest, ItemInput, ListQuotesResponse, QuoteDetailResponse,
    QuoteListQuery, QuoteResponse, QuoteStatus, SetStatusRequest,
};
use ledgerdesk_runtime_config::LedgerConfig;

use crate::accounting::Accounting;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::clients::require_client;
use crate::routes::invoices::{require_invoice, resolve_item};
use crate::routes::{found, today};
use crate::storage::{
    Db, item_from_row, quote_from_row, scalar_i64, sq_execute, sq_find, sq_insert, sq_query_map,
};

fn require_quote(conn: &Connection, id: i64) -> Result<QuoteResponse, ApiErr> {
    let quote = sq_find(conn, billing::get_quote(id), quote_from_row)
        .map_err(ApiErr::from_db("get quote"))?;
    found(quote, "quote")
}

async fn detail(db: &Db, accounting: &Accounting, id: i64) -> Result<QuoteDetailResponse, ApiErr> {
    let (quote, items) = {
        let conn = db.conn();
        let quote = require_quote(&conn, id)?;
        let items = sq_query_map(&conn, billing::list_items(ItemOwner::Quote(id)), item_from_row)
            .map_err(ApiErr::from_db("list quote items"))?;
        (quote, items)
    };
    let totals = accounting.quote_totals(id).await?;
    Ok(QuoteDetailResponse {
        quote,
        items,
        totals,
    })
}

fn insert_quote(
    conn: &mut Connection,
    config: &LedgerConfig,
    req: CreateQuoteRequest,
) -> Result<i64, ApiErr> {
    if sq_find(conn, ledgerdesk_api::db::clients::get(req.client_id), |row| row.get::<_, i64>(0))
        .map_err(ApiErr::from_db("get client"))?
        .is_none()
    {
        return Err(ApiErr::bad_request(format!("unknown client {}", req.client_id)));
    }
    let date = req.date.unwrap_or_else(today);
    if req.expire_date.is_some_and(|expire| expire < date) {
        return Err(ApiErr::bad_request("expire_date must not be before date"));
    }
    let discount = service::validate_non_negative("discount", req.discount.unwrap_or_default())?;
    let note = service::optional_text(req.note);

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let items = req
        .items
        .iter()
        .map(|input| resolve_item(&tx, input))
        .collect::<Result<Vec<_>, _>>()?;
    let prefix = config.billing.quote_prefix.as_str();
    let current = scalar_i64(&tx, billing::max_quote_number(prefix))
        .map_err(ApiErr::from_db("next quote number"))?;
    let id = sq_insert(
        &tx,
        billing::insert_quote(&NewQuote {
            client_id: req.client_id,
            prefix,
            number: service::next_number(current),
            date,
            expire_date: req.expire_date,
            discount,
            note: note.as_deref(),
        }),
    )
    .map_err(ApiErr::from_write("insert quote", "quote number already taken"))?;
    for item in &items {
        sq_insert(&tx, billing::insert_item(ItemOwner::Quote(id), item))
            .map_err(ApiErr::from_db("insert quote item"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    Ok(id)
}

/// POST /api/quotes
pub async fn create_quote(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Json(req): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<QuoteDetailResponse>), ApiErr> {
    let id = {
        let mut conn = db.conn();
        insert_quote(&mut conn, &config, req)?
    };
    tracing::info!(quote_id = id, "quote created");
    Ok((StatusCode::CREATED, Json(detail(&db, &accounting, id).await?)))
}

/// GET /api/quotes/{id}
pub async fn get_quote(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<QuoteDetailResponse>, ApiErr> {
    detail(&db, &accounting, id).await.map(Json)
}

/// GET /api/quotes
pub async fn list_quotes(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<QuoteListQuery>,
) -> Result<Json<ListQuotesResponse>, ApiErr> {
    let conn = db.conn();
    let quotes = sq_query_map(&conn, billing::list_quotes(&q), quote_from_row)
        .map_err(ApiErr::from_db("list quotes"))?;
    Ok(Json(ListQuotesResponse { quotes }))
}

/// POST /api/quotes/{id}/items
pub async fn add_quote_item(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<QuoteDetailResponse>), ApiErr> {
    {
        let conn = db.conn();
        let quote = require_quote(&conn, id)?;
        if quote.invoice_id.is_some() {
            return Err(ApiErr::conflict("quote has already been invoiced"));
        }
        let item = resolve_item(&conn, &input)?;
        sq_insert(&conn, billing::insert_item(ItemOwner::Quote(id), &item))
            .map_err(ApiErr::from_db("insert quote item"))?;
    }
    accounting.invalidate_quote(id).await;
    Ok((StatusCode::CREATED, Json(detail(&db, &accounting, id).await?)))
}

/// PUT /api/quotes/{id}/status
///
/// `invoiced` is reserved for conversion.
pub async fn set_quote_status(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SetStatusRequest<QuoteStatus>>,
) -> Result<Json<QuoteResponse>, ApiErr> {
    if req.status == QuoteStatus::Invoiced {
        return Err(ApiErr::bad_request("convert the quote to mark it invoiced"));
    }
    let conn = db.conn();
    let quote = require_quote(&conn, id)?;
    if quote.invoice_id.is_some() {
        return Err(ApiErr::conflict("quote has already been invoiced"));
    }
    sq_execute(&conn, billing::set_quote_status(id, req.status))
        .map_err(ApiErr::from_db("set quote status"))?;
    tracing::info!(quote_id = id, from = %quote.status, to = %req.status, "quote status set");
    Ok(Json(require_quote(&conn, id)?))
}

fn convert(
    conn: &mut Connection,
    config: &LedgerConfig,
    id: i64,
) -> Result<ConvertQuoteResponse, ApiErr> {
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let quote = require_quote(&tx, id)?;
    if quote.invoice_id.is_some() {
        return Err(ApiErr::conflict("quote has already been invoiced"));
    }
    if quote.status == QuoteStatus::Declined {
        return Err(ApiErr::conflict("cannot convert a declined quote"));
    }
    let client = require_client(&tx, quote.client_id)?;
    let date = today();
    let net_terms = client.net_terms.unwrap_or(config.billing.default_net_terms);

    let prefix = config.billing.invoice_prefix.as_str();
    let current = scalar_i64(&tx, billing::max_invoice_number(prefix))
        .map_err(ApiErr::from_db("next invoice number"))?;
    let invoice_id = sq_insert(
        &tx,
        billing::insert_invoice(&NewInvoice {
            client_id: quote.client_id,
            prefix,
            number: service::next_number(current),
            date,
            due_date: service::due_date(date, net_terms),
            discount: quote.discount,
            note: quote.note.as_deref(),
        }),
    )
    .map_err(ApiErr::from_write("insert invoice", "invoice number already taken"))?;

    let items = sq_query_map(&tx, billing::list_items(ItemOwner::Quote(id)), item_from_row)
        .map_err(ApiErr::from_db("list quote items"))?;
    for item in &items {
        let copy = NewItem {
            product_id: item.product_id,
            name: item.name.clone(),
            description: item.description.clone(),
            quantity: item.quantity,
            price: item.price,
            discount: item.discount,
            tax_id: item.tax_id,
        };
        sq_insert(&tx, billing::insert_item(ItemOwner::Invoice(invoice_id), &copy))
            .map_err(ApiErr::from_db("copy quote item"))?;
    }

    let marked = sq_execute(&tx, billing::mark_quote_invoiced(id, invoice_id))
        .map_err(ApiErr::from_db("mark quote invoiced"))?;
    if marked == 0 {
        return Err(ApiErr::conflict("quote has already been invoiced"));
    }
    let quote = require_quote(&tx, id)?;
    let invoice = require_invoice(&tx, invoice_id)?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    Ok(ConvertQuoteResponse { quote, invoice })
}

/// POST /api/quotes/{id}/convert - turn the quote into a draft invoice.
pub async fn convert_quote(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<ConvertQuoteResponse>), ApiErr> {
    let converted = {
        let mut conn = db.conn();
        convert(&mut conn, &config, id)?
    };
    tracing::info!(quote_id = id, invoice_id = converted.invoice.id, "quote converted");
    accounting.invalidate_quote(id).await;
    accounting
        .invalidate_invoice(converted.invoice.id, converted.invoice.client_id)
        .await;
    Ok((StatusCode::CREATED, Json(converted)))
}
