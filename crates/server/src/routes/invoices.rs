use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use rust_decimal::Decimal;

use ledgerdesk_api::db::billing::{self, ItemOwner, NewInvoice, NewItem, NewPayment};
use ledgerdesk_api::db::{self, banking, clients, email};
use ledgerdesk_api::service::{self, PageWindow};
use ledgerdesk_api::{
    CreateInvoiceRequest, DocumentTotals, InvoiceDetailResponse, InvoiceListQuery,
    InvoiceListResponse, InvoiceResponse, InvoiceStatus, ItemInput, ItemResponse,
    ListPaymentsResponse, OkResponse, PaymentResponse, RecordPaymentRequest,
    RecordPaymentResponse, SendInvoiceResponse, SetStatusRequest, UpdateInvoiceRequest,
    UpdateItemRequest,
};
use ledgerdesk_runtime_config::LedgerConfig;

use crate::accounting::{Accounting, compute_invoice_totals};
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::catalog::{find_product, find_tax};
use crate::routes::clients::require_client;
use crate::routes::{found, today};
use crate::storage::{
    Db, invoice_from_row, item_from_row, payment_from_row, scalar_i64, sq_execute, sq_find,
    sq_insert, sq_query_map,
};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn require_invoice(conn: &Connection, id: i64) -> Result<InvoiceResponse, ApiErr> {
    let invoice = sq_find(conn, billing::get_invoice(id), invoice_from_row)
        .map_err(ApiErr::from_db("get invoice"))?;
    found(invoice, "invoice")
}

fn invoice_totals_now(conn: &Connection, id: i64) -> Result<DocumentTotals, ApiErr> {
    let totals = compute_invoice_totals(conn, id).map_err(ApiErr::from_db("invoice totals"))?;
    found(totals, "invoice")
}

fn check_tax(conn: &Connection, tax_id: Option<i64>) -> Result<(), ApiErr> {
    match tax_id {
        Some(id) if find_tax(conn, id)?.is_none() => {
            Err(ApiErr::bad_request(format!("unknown tax {id}")))
        }
        _ => Ok(()),
    }
}

fn check_line_amounts(item: &NewItem) -> Result<(), ApiErr> {
    service::validate_positive("quantity", item.quantity)?;
    service::validate_non_negative("price", item.price)?;
    service::validate_non_negative("discount", item.discount)?;
    Ok(())
}

/// Resolve a requested line. Fields left unset are taken from the product;
/// free-form lines need a name and a price.
pub(crate) fn resolve_item(conn: &Connection, input: &ItemInput) -> Result<NewItem, ApiErr> {
    let product = match input.product_id {
        Some(id) => Some(
            find_product(conn, id)?
                .ok_or_else(|| ApiErr::bad_request(format!("unknown product {id}")))?,
        ),
        None => None,
    };

    let name = match (service::optional_text(input.name.clone()), &product) {
        (Some(name), _) => name,
        (None, Some(p)) => p.name.clone(),
        (None, None) => return Err(ApiErr::bad_request("item name is required")),
    };
    let price = match (input.price, &product) {
        (Some(price), _) => price,
        (None, Some(p)) => p.price,
        (None, None) => return Err(ApiErr::bad_request("item price is required")),
    };
    let item = NewItem {
        product_id: input.product_id,
        name: service::validate_name("name", &name, 200)?,
        description: service::optional_text(input.description.clone())
            .or_else(|| product.as_ref().and_then(|p| p.description.clone())),
        quantity: input.quantity.unwrap_or(Decimal::ONE),
        price,
        discount: input.discount.unwrap_or_default(),
        tax_id: input.tax_id.or_else(|| product.as_ref().and_then(|p| p.tax_id)),
    };
    check_line_amounts(&item)?;
    check_tax(conn, item.tax_id)?;
    Ok(item)
}

/// Apply a partial edit to an existing line.
pub(crate) fn merge_item(
    conn: &Connection,
    current: &ItemResponse,
    req: UpdateItemRequest,
) -> Result<NewItem, ApiErr> {
    let item = NewItem {
        product_id: current.product_id,
        name: match req.name {
            Some(name) => service::validate_name("name", &name, 200)?,
            None => current.name.clone(),
        },
        description: match req.description {
            Some(description) => service::optional_text(Some(description)),
            None => current.description.clone(),
        },
        quantity: req.quantity.unwrap_or(current.quantity),
        price: req.price.unwrap_or(current.price),
        discount: req.discount.unwrap_or(current.discount),
        tax_id: if req.clear_tax {
            None
        } else {
            req.tax_id.or(current.tax_id)
        },
    };
    check_line_amounts(&item)?;
    check_tax(conn, item.tax_id)?;
    Ok(item)
}

/// Bring the status in line with the payments after totals changed.
/// Cancelled invoices are left alone.
fn refresh_status(conn: &Connection, invoice: &InvoiceResponse) -> Result<InvoiceStatus, ApiErr> {
    if invoice.status == InvoiceStatus::Cancelled {
        return Ok(invoice.status);
    }
    let totals = invoice_totals_now(conn, invoice.id)?;
    let status = service::status_after_payments(invoice.status, &totals);
    if status != invoice.status {
        sq_execute(conn, billing::set_invoice_status(invoice.id, status))
            .map_err(ApiErr::from_db("update invoice status"))?;
        tracing::info!(invoice_id = invoice.id, from = %invoice.status, to = %status, "invoice status changed");
    }
    Ok(status)
}

fn load_lines(conn: &Connection, id: i64) -> Result<(Vec<ItemResponse>, Vec<PaymentResponse>), ApiErr> {
    let items = sq_query_map(conn, billing::list_items(ItemOwner::Invoice(id)), item_from_row)
        .map_err(ApiErr::from_db("list invoice items"))?;
    let payments = sq_query_map(conn, billing::list_payments(id), payment_from_row)
        .map_err(ApiErr::from_db("list payments"))?;
    Ok((items, payments))
}

async fn detail(db: &Db, accounting: &Accounting, id: i64) -> Result<InvoiceDetailResponse, ApiErr> {
    let (invoice, items, payments) = {
        let conn = db.conn();
        let invoice = require_invoice(&conn, id)?;
        let (items, payments) = load_lines(&conn, id)?;
        (invoice, items, payments)
    };
    let totals = accounting.invoice_totals(id).await?;
    Ok(InvoiceDetailResponse {
        invoice,
        items,
        payments,
        totals,
    })
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

fn insert_invoice(
    conn: &mut Connection,
    config: &LedgerConfig,
    req: CreateInvoiceRequest,
) -> Result<i64, ApiErr> {
    let client = require_client(conn, req.client_id)
        .map_err(|_| ApiErr::bad_request(format!("unknown client {}", req.client_id)))?;
    let date = req.date.unwrap_or_else(today);
    let net_terms = client.net_terms.unwrap_or(config.billing.default_net_terms);
    let due_date = req
        .due_date
        .unwrap_or_else(|| service::due_date(date, net_terms));
    if due_date < date {
        return Err(ApiErr::bad_request("due_date must not be before date"));
    }
    let discount = service::validate_non_negative("discount", req.discount.unwrap_or_default())?;
    let note = service::optional_text(req.note);

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let items = req
        .items
        .iter()
        .map(|input| resolve_item(&tx, input))
        .collect::<Result<Vec<_>, _>>()?;

    let prefix = config.billing.invoice_prefix.as_str();
    let current = scalar_i64(&tx, billing::max_invoice_number(prefix))
        .map_err(ApiErr::from_db("next invoice number"))?;
    let id = sq_insert(
        &tx,
        billing::insert_invoice(&NewInvoice {
            client_id: client.id,
            prefix,
            number: service::next_number(current),
            date,
            due_date,
            discount,
            note: note.as_deref(),
        }),
    )
    .map_err(ApiErr::from_write("insert invoice", "invoice number already taken"))?;
    for item in &items {
        sq_insert(&tx, billing::insert_item(ItemOwner::Invoice(id), item))
            .map_err(ApiErr::from_db("insert invoice item"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    Ok(id)
}

/// POST /api/invoices - create a draft invoice with its lines.
pub async fn create_invoice(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceDetailResponse>), ApiErr> {
    let client_id = req.client_id;
    let id = {
        let mut conn = db.conn();
        insert_invoice(&mut conn, &config, req)?
    };
    tracing::info!(invoice_id = id, client_id, "invoice created");
    accounting.invalidate_invoice(id, client_id).await;
    Ok((StatusCode::CREATED, Json(detail(&db, &accounting, id).await?)))
}

/// GET /api/invoices/{id} - invoice with items, payments and totals.
pub async fn get_invoice(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<InvoiceDetailResponse>, ApiErr> {
    detail(&db, &accounting, id).await.map(Json)
}

/// GET /api/invoices - paginated listing.
pub async fn list_invoices(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<InvoiceListQuery>,
) -> Result<Json<InvoiceListResponse>, ApiErr> {
    let built = billing::list_invoices(&q, PageWindow::new(q.page, q.per_page));
    let conn = db.conn();
    let total = scalar_i64(&conn, built.count_query)
        .map_err(ApiErr::from_db("count invoices"))?
        .unwrap_or(0);
    let invoices = sq_query_map(&conn, built.select_query, invoice_from_row)
        .map_err(ApiErr::from_db("list invoices"))?;
    Ok(Json(InvoiceListResponse {
        invoices,
        total,
        page: built.page,
        per_page: built.per_page,
    }))
}

/// PUT /api/invoices/{id} - edit dates, discount or note.
pub async fn update_invoice(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceDetailResponse>, ApiErr> {
    let req = UpdateInvoiceRequest {
        discount: req
            .discount
            .map(|d| service::validate_non_negative("discount", d))
            .transpose()?,
        note: req.note.map(|n| n.trim().to_string()),
        ..req
    };
    let client_id = {
        let conn = db.conn();
        let invoice = require_invoice(&conn, id)?;
        let date = req.date.unwrap_or(invoice.date);
        let due_date = req.due_date.unwrap_or(invoice.due_date);
        if due_date < date {
            return Err(ApiErr::bad_request("due_date must not be before date"));
        }
        sq_execute(&conn, billing::update_invoice(id, &req))
            .map_err(ApiErr::from_db("update invoice"))?;
        refresh_status(&conn, &invoice)?;
        invoice.client_id
    };
    accounting.invalidate_invoice(id, client_id).await;
    detail(&db, &accounting, id).await.map(Json)
}

/// PUT /api/invoices/{id}/status
pub async fn set_invoice_status(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SetStatusRequest<InvoiceStatus>>,
) -> Result<Json<InvoiceResponse>, ApiErr> {
    let invoice = {
        let conn = db.conn();
        let before = require_invoice(&conn, id)?;
        sq_execute(&conn, billing::set_invoice_status(id, req.status))
            .map_err(ApiErr::from_db("set invoice status"))?;
        tracing::info!(invoice_id = id, from = %before.status, to = %req.status, "invoice status set");
        require_invoice(&conn, id)?
    };
    accounting.invalidate_invoice(id, invoice.client_id).await;
    Ok(Json(invoice))
}

fn queue_invoice_email(
    conn: &mut Connection,
    config: &LedgerConfig,
    id: i64,
) -> Result<SendInvoiceResponse, ApiErr> {
    let invoice = require_invoice(conn, id)?;
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(ApiErr::conflict("cannot send a cancelled invoice"));
    }
    let client = require_client(conn, invoice.client_id)?;
    let recipient = match client.email.clone() {
        Some(email) => Some(email),
        None => sq_find(conn, clients::billing_contact_email(client.id), |row| row.get(0))
            .map_err(ApiErr::from_db("billing contact"))?,
    }
    .ok_or_else(|| ApiErr::bad_request("client has no email address"))?;

    let totals = invoice_totals_now(conn, id)?;
    let subject = format!("Invoice {} from {}", invoice.number, config.email.from_name);
    let body = format!(
        "Hello {},\n\nInvoice {} for {} is due on {}.\nBalance due: {}.\nView it at {}\n\nThank you,\n{}",
        client.name,
        invoice.number,
        totals.total,
        invoice.due_date,
        totals.balance,
        config.server.link(&format!("invoices/{id}")),
        config.email.from_name
    );
    let sender = config.email.sender();

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let email_id = sq_insert(
        &tx,
        email::insert(&email::NewEmail {
            sender: &sender,
            recipient: &recipient,
            subject: &subject,
            body: &body,
        }),
    )
    .map_err(ApiErr::from_db("queue invoice email"))?;
    if invoice.status == InvoiceStatus::Draft {
        sq_execute(&tx, billing::set_invoice_status(id, InvoiceStatus::Sent))
            .map_err(ApiErr::from_db("mark invoice sent"))?;
    }
    let invoice = require_invoice(&tx, id)?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    Ok(SendInvoiceResponse {
        invoice,
        email_id,
        recipient,
    })
}

/// POST /api/invoices/{id}/send - queue the invoice email and mark it sent.
pub async fn send_invoice(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<SendInvoiceResponse>, ApiErr> {
    let sent = {
        let mut conn = db.conn();
        queue_invoice_email(&mut conn, &config, id)?
    };
    tracing::info!(invoice_id = id, email_id = sent.email_id, "invoice queued for sending");
    accounting.invalidate_invoice(id, sent.invoice.client_id).await;
    Ok(Json(sent))
}

async fn set_invoice_archived(
    db: &Db,
    accounting: &Accounting,
    id: i64,
    archived: bool,
) -> Result<InvoiceResponse, ApiErr> {
    let invoice = {
        let conn = db.conn();
        require_invoice(&conn, id)?;
        sq_execute(
            &conn,
            db::set_archived(db::Invoices::Table, db::Invoices::Id, db::Invoices::ArchivedAt, id, archived),
        )
        .map_err(ApiErr::from_db("archive invoice"))?;
        require_invoice(&conn, id)?
    };
    accounting.invalidate_invoice(id, invoice.client_id).await;
    Ok(invoice)
}

/// POST /api/invoices/{id}/archive
pub async fn archive_invoice(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<InvoiceResponse>, ApiErr> {
    set_invoice_archived(&db, &accounting, id, true).await.map(Json)
}

/// POST /api/invoices/{id}/unarchive
pub async fn unarchive_invoice(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<InvoiceResponse>, ApiErr> {
    set_invoice_archived(&db, &accounting, id, false).await.map(Json)
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// Run an item change and re-derive the status, all in one transaction.
fn change_items(
    conn: &mut Connection,
    id: i64,
    change: impl FnOnce(&Connection) -> Result<(), ApiErr>,
) -> Result<i64, ApiErr> {
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let invoice = require_invoice(&tx, id)?;
    change(&tx)?;
    refresh_status(&tx, &invoice)?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    Ok(invoice.client_id)
}

/// POST /api/invoices/{id}/items - add a line.
pub async fn add_item(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<InvoiceDetailResponse>), ApiErr> {
    let client_id = {
        let mut conn = db.conn();
        change_items(&mut conn, id, |tx| {
            let item = resolve_item(tx, &input)?;
            sq_insert(tx, billing::insert_item(ItemOwner::Invoice(id), &item))
                .map_err(ApiErr::from_db("insert invoice item"))?;
            Ok(())
        })?
    };
    accounting.invalidate_invoice(id, client_id).await;
    Ok((StatusCode::CREATED, Json(detail(&db, &accounting, id).await?)))
}

/// PUT /api/invoices/{id}/items/{item_id} - edit a line.
pub async fn update_item(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path((id, item_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<InvoiceDetailResponse>, ApiErr> {
    let client_id = {
        let mut conn = db.conn();
        change_items(&mut conn, id, |tx| {
            let current = sq_find(tx, billing::get_item(ItemOwner::Invoice(id), item_id), item_from_row)
                .map_err(ApiErr::from_db("get invoice item"))?;
            let current = found(current, "item")?;
            let item = merge_item(tx, &current, req)?;
            sq_execute(tx, billing::update_item(item_id, &item))
                .map_err(ApiErr::from_db("update invoice item"))?;
            Ok(())
        })?
    };
    accounting.invalidate_invoice(id, client_id).await;
    detail(&db, &accounting, id).await.map(Json)
}

/// DELETE /api/invoices/{id}/items/{item_id}
pub async fn delete_item(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<Json<InvoiceDetailResponse>, ApiErr> {
    let client_id = {
        let mut conn = db.conn();
        change_items(&mut conn, id, |tx| {
            let current = sq_find(tx, billing::get_item(ItemOwner::Invoice(id), item_id), item_from_row)
                .map_err(ApiErr::from_db("get invoice item"))?;
            found(current, "item")?;
            sq_execute(tx, billing::delete_item(item_id))
                .map_err(ApiErr::from_db("delete invoice item"))?;
            Ok(())
        })?
    };
    accounting.invalidate_invoice(id, client_id).await;
    detail(&db, &accounting, id).await.map(Json)
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

fn insert_payment(
    conn: &mut Connection,
    invoice_id: i64,
    req: RecordPaymentRequest,
) -> Result<(InvoiceResponse, RecordPaymentResponse), ApiErr> {
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let invoice = require_invoice(&tx, invoice_id)?;
    let totals = invoice_totals_now(&tx, invoice_id)?;
    let amount = service::check_payment(invoice.status, req.amount, &totals)?;
    if let Some(account_id) = req.account_id {
        let account = sq_find(&tx, banking::get_account(account_id), |row| row.get::<_, i64>(0))
            .map_err(ApiErr::from_db("get account"))?;
        if account.is_none() {
            return Err(ApiErr::bad_request(format!("unknown account {account_id}")));
        }
    }

    let reference = service::optional_text(req.reference);
    let payment_id = sq_insert(
        &tx,
        billing::insert_payment(&NewPayment {
            invoice_id,
            account_id: req.account_id,
            date: req.date.unwrap_or_else(today),
            amount,
            method: req.method,
            reference: reference.as_deref(),
        }),
    )
    .map_err(ApiErr::from_db("insert payment"))?;
    let invoice_status = refresh_status(&tx, &invoice)?;
    let totals = invoice_totals_now(&tx, invoice_id)?;
    let payment = sq_find(&tx, billing::get_payment(invoice_id, payment_id), payment_from_row)
        .map_err(ApiErr::from_db("load payment"))?;
    let payment = found(payment, "payment")?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    Ok((
        invoice,
        RecordPaymentResponse {
            payment,
            invoice_status,
            totals,
        },
    ))
}

/// POST /api/invoices/{id}/payments - record a payment against the balance.
pub async fn record_payment(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentResponse>), ApiErr> {
    let (invoice, resp) = {
        let mut conn = db.conn();
        insert_payment(&mut conn, id, req)?
    };
    tracing::info!(
        invoice_id = id,
        payment_id = resp.payment.id,
        amount = %resp.payment.amount,
        "payment recorded"
    );
    accounting.invalidate_invoice(id, invoice.client_id).await;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/invoices/{id}/payments
pub async fn list_payments(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ListPaymentsResponse>, ApiErr> {
    let conn = db.conn();
    require_invoice(&conn, id)?;
    let payments = sq_query_map(&conn, billing::list_payments(id), payment_from_row)
        .map_err(ApiErr::from_db("list payments"))?;
    Ok(Json(ListPaymentsResponse { payments }))
}

/// DELETE /api/invoices/{id}/payments/{payment_id} - remove a payment and
/// re-derive the invoice status.
pub async fn delete_payment(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path((id, payment_id)): Path<(i64, i64)>,
) -> Result<Json<OkResponse>, ApiErr> {
    let client_id = {
        let mut conn = db.conn();
        let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
        let invoice = require_invoice(&tx, id)?;
        let payment = sq_find(&tx, billing::get_payment(id, payment_id), payment_from_row)
            .map_err(ApiErr::from_db("get payment"))?;
        found(payment, "payment")?;
        sq_execute(&tx, billing::delete_payment(payment_id))
            .map_err(ApiErr::from_db("delete payment"))?;
        refresh_status(&tx, &invoice)?;
        tx.commit().map_err(ApiErr::from_db("commit"))?;
        invoice.client_id
    };
    tracing::info!(invoice_id = id, payment_id, "payment deleted");
    accounting.invalidate_invoice(id, client_id).await;
    Ok(Json(OkResponse { ok: true }))
}
