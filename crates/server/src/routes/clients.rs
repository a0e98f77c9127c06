use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use rust_decimal::Decimal;

use ledgerdesk_api::db::{self, clients};
use ledgerdesk_api::service::{self, PageWindow};
use ledgerdesk_api::{
    ArchivedQuery, ClientDetailResponse, ClientListQuery, ClientListResponse, ClientResponse,
    ContactResponse, CreateClientRequest, CreateContactRequest, CreateDocumentRequest,
    CreateLocationRequest, DocumentResponse, ListContactsResponse, ListDocumentsResponse,
    ListLocationsResponse, LocationResponse, UpdateClientRequest, UpdateContactRequest,
    UpdateDocumentRequest, UpdateLocationRequest,
};

use crate::accounting::Accounting;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::{found, today};
use crate::storage::{
    Db, client_from_row, contact_from_row, document_from_row, location_from_row, scalar_i64,
    sq_execute, sq_find, sq_insert, sq_query_map,
};

/// Load an active or archived client, 404 when missing.
pub(crate) fn require_client(conn: &Connection, id: i64) -> Result<ClientResponse, ApiErr> {
    let client = sq_find(conn, clients::get(id), client_from_row)
        .map_err(ApiErr::from_db("get client"))?;
    found(client, "client")
}

pub(crate) fn optional_rate(rate: Option<Decimal>) -> Result<Option<Decimal>, ApiErr> {
    rate.map(|r| service::validate_non_negative("hourly_rate", r))
        .transpose()
        .map_err(ApiErr::from)
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// POST /api/clients - create a client.
pub async fn create_client(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), ApiErr> {
    let req = CreateClientRequest {
        name: service::validate_name("name", &req.name, 200)?,
        email: service::optional_email(req.email)?,
        phone: service::optional_text(req.phone),
        website: service::optional_text(req.website),
        net_terms: req.net_terms,
        hourly_rate: optional_rate(req.hourly_rate)?,
        notes: service::optional_text(req.notes),
    };

    let conn = db.conn();
    let id = sq_insert(&conn, clients::insert(&req)).map_err(ApiErr::from_db("insert client"))?;
    let client = require_client(&conn, id)?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /api/clients - paginated listing with name search.
pub async fn list_clients(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<ClientListQuery>,
) -> Result<Json<ClientListResponse>, ApiErr> {
    let window = PageWindow::new(q.page, q.per_page);
    let built = clients::list(q.search.as_deref(), q.archived, window);

    let conn = db.conn();
    let total = scalar_i64(&conn, built.count_query)
        .map_err(ApiErr::from_db("count clients"))?
        .unwrap_or(0);
    let clients = sq_query_map(&conn, built.select_query, client_from_row)
        .map_err(ApiErr::from_db("list clients"))?;

    Ok(Json(ClientListResponse {
        clients,
        total,
        page: built.page,
        per_page: built.per_page,
    }))
}

/// GET /api/clients/{id} - client with outstanding balance and aging.
pub async fn get_client(
    State(db): State<Db>,
    State(accounting): State<Accounting>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ClientDetailResponse>, ApiErr> {
    let client = {
        let conn = db.conn();
        require_client(&conn, id)?
    };
    let balance = accounting.client_balance(id, today()).await?;
    Ok(Json(ClientDetailResponse { client, balance }))
}

/// PUT /api/clients/{id} - update the given fields.
pub async fn update_client(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<ClientResponse>, ApiErr> {
    let req = UpdateClientRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        email: req.email.map(|e| service::validate_email(&e)).transpose()?,
        phone: req.phone,
        website: req.website,
        net_terms: req.net_terms,
        hourly_rate: optional_rate(req.hourly_rate)?,
        notes: req.notes,
    };

    let conn = db.conn();
    require_client(&conn, id)?;
    if let Some(update) = clients::update(id, &req) {
        sq_execute(&conn, update).map_err(ApiErr::from_db("update client"))?;
    }
    Ok(Json(require_client(&conn, id)?))
}

fn set_client_archived(db: &Db, id: i64, archived: bool) -> Result<ClientResponse, ApiErr> {
    let conn = db.conn();
    let changed = sq_execute(
        &conn,
        db::set_archived(db::Clients::Table, db::Clients::Id, db::Clients::ArchivedAt, id, archived),
    )
    .map_err(ApiErr::from_db("archive client"))?;
    if changed == 0 {
        return Err(ApiErr::not_found("client not found"));
    }
    require_client(&conn, id)
}

/// POST /api/clients/{id}/archive
pub async fn archive_client(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ClientResponse>, ApiErr> {
    set_client_archived(&db, id, true).map(Json)
}

/// POST /api/clients/{id}/unarchive
pub async fn unarchive_client(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ClientResponse>, ApiErr> {
    set_client_archived(&db, id, false).map(Json)
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

fn require_contact(conn: &Connection, client_id: i64, id: i64) -> Result<ContactResponse, ApiErr> {
    let contact = sq_find(conn, clients::get_contact(client_id, id), contact_from_row)
        .map_err(ApiErr::from_db("get contact"))?;
    found(contact, "contact")
}

/// POST /api/clients/{id}/contacts - add a contact. A primary contact
/// demotes the previous one.
pub async fn create_contact(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Json(req): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiErr> {
    let req = CreateContactRequest {
        name: service::validate_name("name", &req.name, 200)?,
        title: service::optional_text(req.title),
        email: service::optional_email(req.email)?,
        phone: service::optional_text(req.phone),
        is_primary: req.is_primary,
    };

    let mut conn = db.conn();
    require_client(&conn, client_id)?;
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let id = sq_insert(&tx, clients::insert_contact(client_id, &req))
        .map_err(ApiErr::from_db("insert contact"))?;
    if req.is_primary {
        sq_execute(&tx, clients::clear_primary_contact(client_id, id))
            .map_err(ApiErr::from_db("demote contacts"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    Ok((StatusCode::CREATED, Json(require_contact(&conn, client_id, id)?)))
}

/// GET /api/clients/{id}/contacts
pub async fn list_contacts(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListContactsResponse>, ApiErr> {
    let conn = db.conn();
    require_client(&conn, client_id)?;
    let contacts = sq_query_map(&conn, clients::list_contacts(client_id, q.archived), contact_from_row)
        .map_err(ApiErr::from_db("list contacts"))?;
    Ok(Json(ListContactsResponse { contacts }))
}

/// GET /api/clients/{id}/contacts/{contact_id}
pub async fn get_contact(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<ContactResponse>, ApiErr> {
    let conn = db.conn();
    require_contact(&conn, client_id, id).map(Json)
}

/// PUT /api/clients/{id}/contacts/{contact_id}
pub async fn update_contact(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
    Json(req): Json<UpdateContactRequest>,
) -> Result<Json<ContactResponse>, ApiErr> {
    let req = UpdateContactRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        email: req.email.map(|e| service::validate_email(&e)).transpose()?,
        ..req
    };

    let mut conn = db.conn();
    require_contact(&conn, client_id, id)?;
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    if let Some(update) = clients::update_contact(id, &req) {
        sq_execute(&tx, update).map_err(ApiErr::from_db("update contact"))?;
    }
    if req.is_primary == Some(true) {
        sq_execute(&tx, clients::clear_primary_contact(client_id, id))
            .map_err(ApiErr::from_db("demote contacts"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    require_contact(&conn, client_id, id).map(Json)
}

/// POST /api/clients/{id}/contacts/{contact_id}/archive
pub async fn archive_contact(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<ContactResponse>, ApiErr> {
    let conn = db.conn();
    require_contact(&conn, client_id, id)?;
    sq_execute(
        &conn,
        db::set_archived(db::Contacts::Table, db::Contacts::Id, db::Contacts::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive contact"))?;
    require_contact(&conn, client_id, id).map(Json)
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

fn require_location(conn: &Connection, client_id: i64, id: i64) -> Result<LocationResponse, ApiErr> {
    let location = sq_find(conn, clients::get_location(client_id, id), location_from_row)
        .map_err(ApiErr::from_db("get location"))?;
    found(location, "location")
}

/// POST /api/clients/{id}/locations
pub async fn create_location(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Json(req): Json<CreateLocationRequest>,
) -> Result<(StatusCode, Json<LocationResponse>), ApiErr> {
    let req = CreateLocationRequest {
        name: service::validate_name("name", &req.name, 200)?,
        address: service::optional_text(req.address),
        city: service::optional_text(req.city),
        state: service::optional_text(req.state),
        zip: service::optional_text(req.zip),
        phone: service::optional_text(req.phone),
        is_primary: req.is_primary,
    };

    let mut conn = db.conn();
    require_client(&conn, client_id)?;
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let id = sq_insert(&tx, clients::insert_location(client_id, &req))
        .map_err(ApiErr::from_db("insert location"))?;
    if req.is_primary {
        sq_execute(&tx, clients::clear_primary_location(client_id, id))
            .map_err(ApiErr::from_db("demote locations"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    Ok((StatusCode::CREATED, Json(require_location(&conn, client_id, id)?)))
}

/// GET /api/clients/{id}/locations
pub async fn list_locations(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListLocationsResponse>, ApiErr> {
    let conn = db.conn();
    require_client(&conn, client_id)?;
    let locations =
        sq_query_map(&conn, clients::list_locations(client_id, q.archived), location_from_row)
            .map_err(ApiErr::from_db("list locations"))?;
    Ok(Json(ListLocationsResponse { locations }))
}

/// GET /api/clients/{id}/locations/{location_id}
pub async fn get_location(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<LocationResponse>, ApiErr> {
    let conn = db.conn();
    require_location(&conn, client_id, id).map(Json)
}

/// PUT /api/clients/{id}/locations/{location_id}
pub async fn update_location(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
    Json(req): Json<UpdateLocationRequest>,
) -> Result<Json<LocationResponse>, ApiErr> {
    let req = UpdateLocationRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        ..req
    };

    let mut conn = db.conn();
    require_location(&conn, client_id, id)?;
    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    if let Some(update) = clients::update_location(id, &req) {
        sq_execute(&tx, update).map_err(ApiErr::from_db("update location"))?;
    }
    if req.is_primary == Some(true) {
        sq_execute(&tx, clients::clear_primary_location(client_id, id))
            .map_err(ApiErr::from_db("demote locations"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    require_location(&conn, client_id, id).map(Json)
}

/// POST /api/clients/{id}/locations/{location_id}/archive
pub async fn archive_location(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<LocationResponse>, ApiErr> {
    let conn = db.conn();
    require_location(&conn, client_id, id)?;
    sq_execute(
        &conn,
        db::set_archived(db::Locations::Table, db::Locations::Id, db::Locations::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive location"))?;
    require_location(&conn, client_id, id).map(Json)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn require_document(conn: &Connection, client_id: i64, id: i64) -> Result<DocumentResponse, ApiErr> {
    let document = sq_find(conn, clients::get_document(client_id, id), document_from_row)
        .map_err(ApiErr::from_db("get document"))?;
    found(document, "document")
}

/// POST /api/clients/{id}/documents
pub async fn create_document(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiErr> {
    let req = CreateDocumentRequest {
        name: service::validate_name("name", &req.name, 200)?,
        content: req.content,
    };
    let conn = db.conn();
    require_client(&conn, client_id)?;
    let id = sq_insert(&conn, clients::insert_document(client_id, &req))
        .map_err(ApiErr::from_db("insert document"))?;
    Ok((StatusCode::CREATED, Json(require_document(&conn, client_id, id)?)))
}

/// GET /api/clients/{id}/documents
pub async fn list_documents(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(client_id): Path<i64>,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListDocumentsResponse>, ApiErr> {
    let conn = db.conn();
    require_client(&conn, client_id)?;
    let documents =
        sq_query_map(&conn, clients::list_documents(client_id, q.archived), document_from_row)
            .map_err(ApiErr::from_db("list documents"))?;
    Ok(Json(ListDocumentsResponse { documents }))
}

/// GET /api/clients/{id}/documents/{document_id}
pub async fn get_document(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<DocumentResponse>, ApiErr> {
    let conn = db.conn();
    require_document(&conn, client_id, id).map(Json)
}

/// PUT /api/clients/{id}/documents/{document_id}
pub async fn update_document(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiErr> {
    let req = UpdateDocumentRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        content: req.content,
    };
    let conn = db.conn();
    require_document(&conn, client_id, id)?;
    sq_execute(&conn, clients::update_document(id, &req))
        .map_err(ApiErr::from_db("update document"))?;
    require_document(&conn, client_id, id).map(Json)
}

/// POST /api/clients/{id}/documents/{document_id}/archive
pub async fn archive_document(
    State(db): State<Db>,
    _auth: AuthUser,
    Path((client_id, id)): Path<(i64, i64)>,
) -> Result<Json<DocumentResponse>, ApiErr> {
    let conn = db.conn();
    require_document(&conn, client_id, id)?;
    sq_execute(
        &conn,
        db::set_archived(db::Documents::Table, db::Documents::Id, db::Documents::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive document"))?;
    require_document(&conn, client_id, id).map(Json)
}
