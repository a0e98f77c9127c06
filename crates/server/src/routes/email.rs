use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use ledgerdesk_api::db::email::{self, NewEmail};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    EmailListQuery, EmailResponse, EmailStatus, EnqueueEmailRequest, ListEmailsResponse,
    MarkFailedRequest,
};
use ledgerdesk_runtime_config::LedgerConfig;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::found;
use crate::storage::{Db, email_from_row, sq_execute, sq_find, sq_insert, sq_query_map};

fn require_email(conn: &Connection, id: i64) -> Result<EmailResponse, ApiErr> {
    let email = sq_find(conn, email::get(id), email_from_row).map_err(ApiErr::from_db("get email"))?;
    found(email, "email")
}

/// POST /api/emails - queue a message from the configured sender.
pub async fn enqueue_email(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    _auth: AuthUser,
    Json(req): Json<EnqueueEmailRequest>,
) -> Result<(StatusCode, Json<EmailResponse>), ApiErr> {
    let recipient = service::validate_email(&req.recipient)?;
    let subject = service::validate_name("subject", &req.subject, 300)?;
    let conn = db.conn();
    let sender = config.email.sender();
    let id = sq_insert(
        &conn,
        email::insert(&NewEmail {
            sender: &sender,
            recipient: &recipient,
            subject: &subject,
            body: &req.body,
        }),
    )
    .map_err(ApiErr::from_db("queue email"))?;
    tracing::info!(email_id = id, "email queued");
    Ok((StatusCode::CREATED, Json(require_email(&conn, id)?)))
}

/// GET /api/emails?status=queued
pub async fn list_emails(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<EmailListQuery>,
) -> Result<Json<ListEmailsResponse>, ApiErr> {
    let conn = db.conn();
    let emails = sq_query_map(&conn, email::list(q.status), email_from_row)
        .map_err(ApiErr::from_db("list emails"))?;
    Ok(Json(ListEmailsResponse { emails }))
}

/// POST /api/emails/{id}/sent
pub async fn mark_sent(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<EmailResponse>, ApiErr> {
    let conn = db.conn();
    let current = require_email(&conn, id)?;
    if current.status == EmailStatus::Sent {
        return Err(ApiErr::conflict("email already sent"));
    }
    sq_execute(&conn, email::mark_sent(id)).map_err(ApiErr::from_db("mark email sent"))?;
    Ok(Json(require_email(&conn, id)?))
}

/// POST /api/emails/{id}/failed - counts an attempt and keeps the error.
pub async fn mark_failed(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<MarkFailedRequest>,
) -> Result<Json<EmailResponse>, ApiErr> {
    let error = req.error.trim();
    if error.is_empty() {
        return Err(ApiErr::bad_request("error is required"));
    }
    let conn = db.conn();
    let current = require_email(&conn, id)?;
    if current.status == EmailStatus::Sent {
        return Err(ApiErr::conflict("email already sent"));
    }
    sq_execute(&conn, email::mark_failed(id, error)).map_err(ApiErr::from_db("mark email failed"))?;
    tracing::warn!(email_id = id, attempts = current.attempts + 1, "email delivery failed");
    Ok(Json(require_email(&conn, id)?))
}
