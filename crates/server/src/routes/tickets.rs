use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use ledgerdesk_api::db::support::{self, NewTicket};
use ledgerdesk_api::db::{clients, users};
use ledgerdesk_api::service::{self, PageWindow};
use ledgerdesk_api::{
    AssignTicketRequest, CreateTicketRequest, ReplyKind, ReplyRequest, SetStatusRequest,
    StatusCount, TicketCountsResponse, TicketDetailResponse, TicketListQuery, TicketListResponse,
    TicketResponse, TicketStatus, UpdateTicketRequest,
};
use ledgerdesk_core::worktime::{format_hms, parse_hms};
use ledgerdesk_runtime_config::LedgerConfig;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::found;
use crate::storage::{
    Db, contact_from_row, project_from_row, reply_from_row, scalar_i64, sq_execute, sq_find,
    sq_insert, sq_query_map, ticket_from_row, user_from_row,
};

pub(crate) fn require_ticket(conn: &Connection, id: i64) -> Result<TicketResponse, ApiErr> {
    let ticket = sq_find(conn, support::get_ticket(id), ticket_from_row)
        .map_err(ApiErr::from_db("get ticket"))?;
    found(ticket, "ticket")
}

fn check_user(conn: &Connection, user_id: Option<i64>) -> Result<(), ApiErr> {
    if let Some(user_id) = user_id {
        let user = sq_find(conn, users::get(user_id), user_from_row)
            .map_err(ApiErr::from_db("get user"))?;
        if user.is_none() {
            return Err(ApiErr::bad_request(format!("unknown user {user_id}")));
        }
    }
    Ok(())
}

fn check_contact(conn: &Connection, client_id: i64, contact_id: Option<i64>) -> Result<(), ApiErr> {
    if let Some(contact_id) = contact_id {
        let contact = sq_find(conn, clients::get_contact(client_id, contact_id), contact_from_row)
            .map_err(ApiErr::from_db("get contact"))?;
        if contact.is_none() {
            return Err(ApiErr::bad_request(format!(
                "contact {contact_id} does not belong to client {client_id}"
            )));
        }
    }
    Ok(())
}

fn check_project(conn: &Connection, project_id: Option<i64>) -> Result<(), ApiErr> {
    if let Some(project_id) = project_id {
        let project = sq_find(conn, support::get_project(project_id), project_from_row)
            .map_err(ApiErr::from_db("get project"))?;
        if project.is_none() {
            return Err(ApiErr::bad_request(format!("unknown project {project_id}")));
        }
    }
    Ok(())
}

/// Apply a status change, stamping or clearing `closed_at`.
fn change_status(conn: &Connection, ticket: &TicketResponse, to: TicketStatus) -> Result<(), ApiErr> {
    if ticket.status == to {
        return Ok(());
    }
    let closed_at = service::closed_at_change(ticket.status, to);
    sq_execute(conn, support::set_ticket_status(ticket.id, to, closed_at))
        .map_err(ApiErr::from_db("set ticket status"))?;
    tracing::info!(ticket_id = ticket.id, from = %ticket.status, to = %to, "ticket status changed");
    Ok(())
}

fn ticket_detail(conn: &Connection, id: i64) -> Result<TicketDetailResponse, ApiErr> {
    let ticket = require_ticket(conn, id)?;
    let rows = sq_query_map(conn, support::list_replies(id), reply_from_row)
        .map_err(ApiErr::from_db("list replies"))?;
    let total_secs = rows
        .iter()
        .fold(0i64, |total, (_, secs)| total.saturating_add(*secs));
    Ok(TicketDetailResponse {
        ticket,
        replies: rows.into_iter().map(|(reply, _)| reply).collect(),
        total_time_worked: format_hms(total_secs),
    })
}

/// POST /api/tickets - open a ticket with status `new`.
pub async fn create_ticket(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    auth: AuthUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketResponse>), ApiErr> {
    let subject = service::validate_name("subject", &req.subject, 200)?;
    let details = req.details.trim().to_string();

    let mut conn = db.conn();
    let client = sq_find(&conn, clients::get(req.client_id), |row| row.get::<_, i64>(0))
        .map_err(ApiErr::from_db("get client"))?;
    if client.is_none() {
        return Err(ApiErr::bad_request(format!("unknown client {}", req.client_id)));
    }
    check_contact(&conn, req.client_id, req.contact_id)?;
    check_project(&conn, req.project_id)?;
    check_user(&conn, req.assigned_to)?;

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let prefix = config.billing.ticket_prefix.as_str();
    let current = scalar_i64(&tx, support::max_ticket_number(prefix))
        .map_err(ApiErr::from_db("next ticket number"))?;
    let id = sq_insert(
        &tx,
        support::insert_ticket(&NewTicket {
            prefix,
            number: service::next_number(current),
            client_id: req.client_id,
            contact_id: req.contact_id,
            project_id: req.project_id,
            subject: &subject,
            details: &details,
            priority: req.priority.unwrap_or(ledgerdesk_api::TicketPriority::Medium),
            assigned_to: req.assigned_to,
            created_by: auth.id(),
        }),
    )
    .map_err(ApiErr::from_write("insert ticket", "ticket number already taken"))?;
    let ticket = require_ticket(&tx, id)?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    tracing::info!(ticket_id = id, number = %ticket.number, "ticket opened");
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/tickets/{id} - with replies and total time worked.
pub async fn get_ticket(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<TicketDetailResponse>, ApiErr> {
    let conn = db.conn();
    Ok(Json(ticket_detail(&conn, id)?))
}

/// GET /api/tickets
pub async fn list_tickets(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<TicketListQuery>,
) -> Result<Json<TicketListResponse>, ApiErr> {
    let built = support::list_tickets(&q, PageWindow::new(q.page, q.per_page));
    let conn = db.conn();
    let total = scalar_i64(&conn, built.count_query)
        .map_err(ApiErr::from_db("count tickets"))?
        .unwrap_or(0);
    let tickets = sq_query_map(&conn, built.select_query, ticket_from_row)
        .map_err(ApiErr::from_db("list tickets"))?;
    Ok(Json(TicketListResponse {
        tickets,
        total,
        page: built.page,
        per_page: built.per_page,
    }))
}

/// PUT /api/tickets/{id}
pub async fn update_ticket(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<TicketResponse>, ApiErr> {
    let req = UpdateTicketRequest {
        subject: req
            .subject
            .map(|s| service::validate_name("subject", &s, 200))
            .transpose()?,
        details: req.details.map(|d| d.trim().to_string()),
        ..req
    };
    let conn = db.conn();
    let ticket = require_ticket(&conn, id)?;
    check_contact(&conn, ticket.client_id, req.contact_id)?;
    sq_execute(&conn, support::update_ticket(id, &req)).map_err(ApiErr::from_db("update ticket"))?;
    Ok(Json(require_ticket(&conn, id)?))
}

/// PUT /api/tickets/{id}/status
pub async fn set_ticket_status(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SetStatusRequest<TicketStatus>>,
) -> Result<Json<TicketResponse>, ApiErr> {
    let conn = db.conn();
    let ticket = require_ticket(&conn, id)?;
    change_status(&conn, &ticket, req.status)?;
    Ok(Json(require_ticket(&conn, id)?))
}

/// PUT /api/tickets/{id}/assign
pub async fn assign_ticket(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<TicketResponse>, ApiErr> {
    let conn = db.conn();
    require_ticket(&conn, id)?;
    check_user(&conn, req.user_id)?;
    sq_execute(&conn, support::assign_ticket(id, req.user_id))
        .map_err(ApiErr::from_db("assign ticket"))?;
    tracing::info!(ticket_id = id, user_id = ?req.user_id, "ticket assigned");
    Ok(Json(require_ticket(&conn, id)?))
}

/// POST /api/tickets/{id}/replies - add a reply, optionally logging time
/// and moving the ticket to a new status.
pub async fn reply_to_ticket(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<TicketDetailResponse>), ApiErr> {
    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiErr::bad_request("body is required"));
    }
    let secs = match service::optional_text(req.time_worked) {
        Some(text) => parse_hms(&text)?,
        None => 0,
    };
    let kind = if req.internal {
        ReplyKind::Internal
    } else {
        ReplyKind::Public
    };

    let mut conn = db.conn();
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let ticket = require_ticket(&tx, id)?;
    sq_insert(&tx, support::insert_reply(id, auth.id(), body, kind, secs))
        .map_err(ApiErr::from_db("insert reply"))?;
    match req.status {
        Some(status) if status != ticket.status => change_status(&tx, &ticket, status)?,
        _ => {
            sq_execute(&tx, support::touch_ticket(id)).map_err(ApiErr::from_db("touch ticket"))?;
        }
    }
    let detail = ticket_detail(&tx, id)?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/tickets/counts - tickets per status.
pub async fn ticket_counts(
    State(db): State<Db>,
    _auth: AuthUser,
) -> Result<Json<TicketCountsResponse>, ApiErr> {
    let conn = db.conn();
    let rows = sq_query_map(&conn, support::status_counts(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })
    .map_err(ApiErr::from_db("ticket counts"))?;
    let by_status: HashMap<TicketStatus, i64> = rows
        .into_iter()
        .filter_map(|(status, count)| TicketStatus::parse(&status).map(|s| (s, count)))
        .collect();

    let counts: Vec<StatusCount> = TicketStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: by_status.get(status).copied().unwrap_or(0),
        })
        .collect();
    let open_total = counts
        .iter()
        .filter(|c| !matches!(c.status, TicketStatus::Resolved | TicketStatus::Closed))
        .map(|c| c.count)
        .sum();
    Ok(Json(TicketCountsResponse { counts, open_total }))
}
