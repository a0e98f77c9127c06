//! Ticket, reply and project query builders.

use sea_query::{
    Asterisk, Expr, Func, Order, Query, SelectStatement, SimpleExpr, SqliteQueryBuilder,
};

use super::tables::{Projects, TicketReplies, Tickets};
use super::{Built, BuiltListQuery, Changes, archived_filter, date, now, opt_date, opt_text};
use crate::service::{ClosedAtChange, PageWindow};
use crate::{
    CreateProjectRequest, ReplyKind, TicketListQuery, TicketPriority, TicketStatus,
    UpdateProjectRequest, UpdateTicketRequest,
};

// ── Tickets ────────────────────────────────────────────────────────────────

/// Columns: id, prefix, number, client_id, contact_id, project_id, subject,
/// details, priority, status, assigned_to, created_by, created_at,
/// updated_at, closed_at. Must match `ticket_from_row()`.
fn ticket_select() -> SelectStatement {
    Query::select()
        .columns([
            Tickets::Id,
            Tickets::Prefix,
            Tickets::Number,
            Tickets::ClientId,
            Tickets::ContactId,
            Tickets::ProjectId,
            Tickets::Subject,
            Tickets::Details,
            Tickets::Priority,
            Tickets::Status,
            Tickets::AssignedTo,
            Tickets::CreatedBy,
            Tickets::CreatedAt,
            Tickets::UpdatedAt,
            Tickets::ClosedAt,
        ])
        .from(Tickets::Table)
        .to_owned()
}

pub fn get_ticket(id: i64) -> Built {
    ticket_select()
        .and_where(Expr::col(Tickets::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn max_ticket_number(prefix: &str) -> Built {
    Query::select()
        .expr(Func::max(Expr::col(Tickets::Number)))
        .from(Tickets::Table)
        .and_where(Expr::col(Tickets::Prefix).eq(prefix))
        .build(SqliteQueryBuilder)
}

/// Parameters for opening a ticket.
pub struct NewTicket<'a> {
    pub prefix: &'a str,
    pub number: i64,
    pub client_id: i64,
    pub contact_id: Option<i64>,
    pub project_id: Option<i64>,
    pub subject: &'a str,
    pub details: &'a str,
    pub priority: TicketPriority,
    pub assigned_to: Option<i64>,
    pub created_by: i64,
}

pub fn insert_ticket(p: &NewTicket<'_>) -> Built {
    Query::insert()
        .into_table(Tickets::Table)
        .columns([
            Tickets::Prefix,
            Tickets::Number,
            Tickets::ClientId,
            Tickets::ContactId,
            Tickets::ProjectId,
            Tickets::Subject,
            Tickets::Details,
            Tickets::Priority,
            Tickets::Status,
            Tickets::AssignedTo,
            Tickets::CreatedBy,
        ])
        .values_panic([
            p.prefix.into(),
            p.number.into(),
            p.client_id.into(),
            p.contact_id.into(),
            p.project_id.into(),
            p.subject.into(),
            p.details.into(),
            p.priority.as_str().into(),
            TicketStatus::New.as_str().into(),
            p.assigned_to.into(),
            p.created_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn list_tickets(q: &TicketListQuery, window: PageWindow) -> BuiltListQuery {
    let mut count = Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Tickets::Table)
        .to_owned();
    let mut select = ticket_select();

    for stmt in [&mut count, &mut select] {
        if let Some(status) = q.status {
            stmt.and_where(Expr::col(Tickets::Status).eq(status.as_str()));
        }
        if let Some(priority) = q.priority {
            stmt.and_where(Expr::col(Tickets::Priority).eq(priority.as_str()));
        }
        if let Some(client_id) = q.client_id {
            stmt.and_where(Expr::col(Tickets::ClientId).eq(client_id));
        }
        if let Some(user_id) = q.assigned_to {
            stmt.and_where(Expr::col(Tickets::AssignedTo).eq(user_id));
        }
    }

    select
        .order_by(Tickets::UpdatedAt, Order::Desc)
        .order_by(Tickets::Id, Order::Desc)
        .limit(u64::from(window.per_page))
        .offset(window.offset());

    BuiltListQuery {
        count_query: count.build(SqliteQueryBuilder),
        select_query: select.build(SqliteQueryBuilder),
        page: window.page,
        per_page: window.per_page,
    }
}

pub fn update_ticket(id: i64, req: &UpdateTicketRequest) -> Built {
    let mut changes = Changes::new(Tickets::Table);
    changes
        .set(Tickets::UpdatedAt, now())
        .set_opt(Tickets::Subject, req.subject.as_deref())
        .set_opt(Tickets::Details, req.details.as_deref())
        .set_opt(Tickets::Priority, req.priority.map(|p| p.as_str()))
        .set_opt(Tickets::ContactId, req.contact_id);
    changes.build_always(Expr::col(Tickets::Id).eq(id))
}

pub fn set_ticket_status(id: i64, status: TicketStatus, closed_at: ClosedAtChange) -> Built {
    let mut changes = Changes::new(Tickets::Table);
    changes
        .set(Tickets::Status, status.as_str())
        .set(Tickets::UpdatedAt, now());
    match closed_at {
        ClosedAtChange::Set => {
            changes.set(Tickets::ClosedAt, now());
        }
        ClosedAtChange::Clear => {
            changes.set(Tickets::ClosedAt, Option::<String>::None);
        }
        ClosedAtChange::Keep => {}
    }
    changes.build_always(Expr::col(Tickets::Id).eq(id))
}

pub fn assign_ticket(id: i64, user_id: Option<i64>) -> Built {
    Query::update()
        .table(Tickets::Table)
        .value(Tickets::AssignedTo, user_id)
        .value(Tickets::UpdatedAt, now())
        .and_where(Expr::col(Tickets::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn link_ticket_to_project(ticket_id: i64, project_id: i64) -> Built {
    Query::update()
        .table(Tickets::Table)
        .value(Tickets::ProjectId, project_id)
        .value(Tickets::UpdatedAt, now())
        .and_where(Expr::col(Tickets::Id).eq(ticket_id))
        .build(SqliteQueryBuilder)
}

pub fn tickets_for_project(project_id: i64) -> Built {
    ticket_select()
        .and_where(Expr::col(Tickets::ProjectId).eq(project_id))
        .order_by(Tickets::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Columns: status, count.
pub fn status_counts() -> Built {
    Query::select()
        .column(Tickets::Status)
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Tickets::Table)
        .group_by_col(Tickets::Status)
        .build(SqliteQueryBuilder)
}

// ── Replies ────────────────────────────────────────────────────────────────

/// Columns: id, ticket_id, user_id, body, kind, time_worked_secs,
/// created_at. Must match `reply_from_row()`.
pub fn list_replies(ticket_id: i64) -> Built {
    Query::select()
        .columns([
            TicketReplies::Id,
            TicketReplies::TicketId,
            TicketReplies::UserId,
            TicketReplies::Body,
            TicketReplies::Kind,
            TicketReplies::TimeWorkedSecs,
            TicketReplies::CreatedAt,
        ])
        .from(TicketReplies::Table)
        .and_where(Expr::col(TicketReplies::TicketId).eq(ticket_id))
        .order_by(TicketReplies::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_reply(
    ticket_id: i64,
    user_id: i64,
    body: &str,
    kind: ReplyKind,
    time_worked_secs: i64,
) -> Built {
    Query::insert()
        .into_table(TicketReplies::Table)
        .columns([
            TicketReplies::TicketId,
            TicketReplies::UserId,
            TicketReplies::Body,
            TicketReplies::Kind,
            TicketReplies::TimeWorkedSecs,
        ])
        .values_panic([
            ticket_id.into(),
            user_id.into(),
            body.into(),
            kind.as_str().into(),
            time_worked_secs.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn touch_ticket(id: i64) -> Built {
    Query::update()
        .table(Tickets::Table)
        .value(Tickets::UpdatedAt, now())
        .and_where(Expr::col(Tickets::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Projects ───────────────────────────────────────────────────────────────

/// Columns: id, client_id, name, description, due_date, completed_at,
/// created_at, archived_at. Must match `project_from_row()`.
fn project_select() -> SelectStatement {
    Query::select()
        .columns([
            Projects::Id,
            Projects::ClientId,
            Projects::Name,
            Projects::Description,
            Projects::DueDate,
            Projects::CompletedAt,
            Projects::CreatedAt,
            Projects::ArchivedAt,
        ])
        .from(Projects::Table)
        .to_owned()
}

pub fn get_project(id: i64) -> Built {
    project_select()
        .and_where(Expr::col(Projects::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list_projects(client_id: Option<i64>, completed: Option<bool>, archived: bool) -> Built {
    let mut select = project_select()
        .and_where(archived_filter(Projects::ArchivedAt, archived))
        .to_owned();
    if let Some(client_id) = client_id {
        select.and_where(Expr::col(Projects::ClientId).eq(client_id));
    }
    if let Some(completed) = completed {
        let filter: SimpleExpr = if completed {
            Expr::col(Projects::CompletedAt).is_not_null()
        } else {
            Expr::col(Projects::CompletedAt).is_null()
        };
        select.and_where(filter);
    }
    select
        .order_by(Projects::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_project(req: &CreateProjectRequest) -> Built {
    Query::insert()
        .into_table(Projects::Table)
        .columns([
            Projects::ClientId,
            Projects::Name,
            Projects::Description,
            Projects::DueDate,
        ])
        .values_panic([
            req.client_id.into(),
            req.name.as_str().into(),
            opt_text(req.description.as_deref()).into(),
            opt_date(req.due_date).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_project(id: i64, req: &UpdateProjectRequest) -> Option<Built> {
    let mut changes = Changes::new(Projects::Table);
    changes
        .set_opt(Projects::Name, req.name.as_deref())
        .set_opt(Projects::Description, req.description.as_deref())
        .set_opt(Projects::DueDate, req.due_date.map(date));
    changes.build(Expr::col(Projects::Id).eq(id))
}

/// Stamp `completed_at` unless already set.
pub fn complete_project(id: i64) -> Built {
    Query::update()
        .table(Projects::Table)
        .value(Projects::CompletedAt, now())
        .and_where(Expr::col(Projects::Id).eq(id))
        .and_where(Expr::col(Projects::CompletedAt).is_null())
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_sets_closed_at() {
        let (sql, _) = set_ticket_status(1, TicketStatus::Closed, ClosedAtChange::Set);
        assert!(sql.contains(r#""closed_at" = datetime('now')"#));

        let (sql, values) = set_ticket_status(1, TicketStatus::Open, ClosedAtChange::Clear);
        assert!(sql.contains(r#""closed_at" = ?"#));
        assert_eq!(values.0[1], sea_query::Value::String(None));

        let (sql, _) = set_ticket_status(1, TicketStatus::OnHold, ClosedAtChange::Keep);
        assert!(!sql.contains("closed_at"));
    }

    #[test]
    fn ticket_filters() {
        let q = TicketListQuery {
            status: Some(TicketStatus::Open),
            priority: Some(TicketPriority::High),
            assigned_to: Some(2),
            ..Default::default()
        };
        let built = list_tickets(&q, PageWindow::new(None, Some(5)));
        let (sql, values) = built.select_query;
        assert!(sql.contains(r#""status" = ? AND "priority" = ? AND "assigned_to" = ?"#));
        assert_eq!(values.0.len(), 5);
    }

    #[test]
    fn new_tickets_start_as_new() {
        let (_, values) = insert_ticket(&NewTicket {
            prefix: "TKT-",
            number: 1,
            client_id: 1,
            contact_id: None,
            project_id: None,
            subject: "Printer",
            details: "",
            priority: TicketPriority::Medium,
            assigned_to: None,
            created_by: 1,
        });
        assert_eq!(values.0[8], sea_query::Value::from("new"));
    }

    #[test]
    fn counts_group_by_status() {
        let (sql, _) = status_counts();
        assert_eq!(
            sql,
            r#"SELECT "status", COUNT(*) FROM "tickets" GROUP BY "status""#
        );
    }
}
