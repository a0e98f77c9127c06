use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use ledgerdesk_api::db::{self, support};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    CreateProjectRequest, ListProjectsResponse, ProjectDetailResponse, ProjectListQuery,
    ProjectResponse, TicketResponse, TicketStatus, UpdateProjectRequest,
};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::found;
use crate::routes::tickets::require_ticket;
use crate::storage::{
    Db, project_from_row, sq_execute, sq_find, sq_insert, sq_query_map, ticket_from_row,
};

fn require_project(conn: &Connection, id: i64) -> Result<ProjectResponse, ApiErr> {
    let project = sq_find(conn, support::get_project(id), project_from_row)
        .map_err(ApiErr::from_db("get project"))?;
    found(project, "project")
}

fn project_detail(conn: &Connection, id: i64) -> Result<ProjectDetailResponse, ApiErr> {
    let project = require_project(conn, id)?;
    let tickets: Vec<TicketResponse> =
        sq_query_map(conn, support::tickets_for_project(id), ticket_from_row)
            .map_err(ApiErr::from_db("project tickets"))?;
    let tickets_total = tickets.len() as i64;
    let tickets_closed = tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Closed)
        .count() as i64;
    Ok(ProjectDetailResponse {
        project,
        tickets_total,
        tickets_closed,
        progress: service::progress_percent(tickets_closed, tickets_total),
        tickets,
    })
}

/// POST /api/projects
pub async fn create_project(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiErr> {
    let req = CreateProjectRequest {
        name: service::validate_name("name", &req.name, 200)?,
        description: service::optional_text(req.description),
        ..req
    };
    let conn = db.conn();
    if let Some(client_id) = req.client_id {
        let client = sq_find(&conn, db::clients::get(client_id), |row| row.get::<_, i64>(0))
            .map_err(ApiErr::from_db("get client"))?;
        if client.is_none() {
            return Err(ApiErr::bad_request(format!("unknown client {client_id}")));
        }
    }
    let id = sq_insert(&conn, support::insert_project(&req))
        .map_err(ApiErr::from_db("insert project"))?;
    tracing::info!(project_id = id, "project created");
    Ok((StatusCode::CREATED, Json(require_project(&conn, id)?)))
}

/// GET /api/projects/{id} - with ticket progress.
pub async fn get_project(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProjectDetailResponse>, ApiErr> {
    let conn = db.conn();
    Ok(Json(project_detail(&conn, id)?))
}

/// GET /api/projects
pub async fn list_projects(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<ProjectListQuery>,
) -> Result<Json<ListProjectsResponse>, ApiErr> {
    let conn = db.conn();
    let projects = sq_query_map(
        &conn,
        support::list_projects(q.client_id, q.completed, q.archived),
        project_from_row,
    )
    .map_err(ApiErr::from_db("list projects"))?;
    Ok(Json(ListProjectsResponse { projects }))
}

/// PUT /api/projects/{id}
pub async fn update_project(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, ApiErr> {
    let req = UpdateProjectRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        ..req
    };
    let conn = db.conn();
    require_project(&conn, id)?;
    if let Some(update) = support::update_project(id, &req) {
        sq_execute(&conn, update).map_err(ApiErr::from_db("update project"))?;
    }
    Ok(Json(require_project(&conn, id)?))
}

/// POST /api/projects/{id}/complete - idempotent.
pub async fn complete_project(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProjectResponse>, ApiErr> {
    let conn = db.conn();
    require_project(&conn, id)?;
    if sq_execute(&conn, support::complete_project(id))
        .map_err(ApiErr::from_db("complete project"))?
        > 0
    {
        tracing::info!(project_id = id, "project completed");
    }
    Ok(Json(require_project(&conn, id)?))
}

/// POST /api/projects/{id}/tickets/{ticket_id} - attach a ticket.
pub async fn link_ticket(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((id, ticket_id)): Path<(i64, i64)>,
) -> Result<Json<ProjectDetailResponse>, ApiErr> {
    let conn = db.conn();
    let project = require_project(&conn, id)?;
    let ticket = require_ticket(&conn, ticket_id)?;
    if project
        .client_id
        .is_some_and(|client_id| client_id != ticket.client_id)
    {
        return Err(ApiErr::bad_request("ticket belongs to a different client"));
    }
    sq_execute(&conn, support::link_ticket_to_project(ticket_id, id))
        .map_err(ApiErr::from_db("link ticket"))?;
    Ok(Json(project_detail(&conn, id)?))
}
