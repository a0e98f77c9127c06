use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use uuid::Uuid;

use ledgerdesk_api::db::{self, assets};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    AssetListQuery, AssetResponse, CreateAssetRequest, ListAssetsResponse, UpdateAssetRequest,
};
use ledgerdesk_core::asset_tag::generate_asset_tag;
use ledgerdesk_runtime_config::LedgerConfig;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::found;
use crate::storage::{Db, asset_from_row, scalar_i64, sq_execute, sq_find, sq_insert, sq_query_map};

fn require_asset(conn: &Connection, id: i64) -> Result<AssetResponse, ApiErr> {
    let asset = sq_find(conn, assets::get(id), asset_from_row).map_err(ApiErr::from_db("get asset"))?;
    found(asset, "asset")
}

fn check_client(conn: &Connection, client_id: Option<i64>) -> Result<(), ApiErr> {
    if let Some(client_id) = client_id {
        let client = sq_find(conn, db::clients::get(client_id), |row| row.get::<_, i64>(0))
            .map_err(ApiErr::from_db("get client"))?;
        if client.is_none() {
            return Err(ApiErr::bad_request(format!("unknown client {client_id}")));
        }
    }
    Ok(())
}

fn tag_taken(conn: &Connection, tag: &str) -> Result<bool, ApiErr> {
    let count = scalar_i64(conn, assets::tag_exists(tag)).map_err(ApiErr::from_db("tag lookup"))?;
    Ok(count.unwrap_or(0) > 0)
}

fn random_tag_number() -> u32 {
    (Uuid::new_v4().as_u128() % 1_000_000) as u32
}

/// POST /api/assets - the tag is generated unless one is supplied.
pub async fn create_asset(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    _auth: AuthUser,
    Json(req): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<AssetResponse>), ApiErr> {
    let req = CreateAssetRequest {
        name: service::validate_name("name", &req.name, 200)?,
        asset_type: service::validate_name("asset_type", &req.asset_type, 50)?,
        tag: service::optional_text(req.tag).map(|t| t.to_ascii_uppercase()),
        make: service::optional_text(req.make),
        model: service::optional_text(req.model),
        serial: service::optional_text(req.serial),
        notes: service::optional_text(req.notes),
        ..req
    };
    let conn = db.conn();
    check_client(&conn, req.client_id)?;

    let tag = match &req.tag {
        Some(tag) if tag_taken(&conn, tag)? => {
            return Err(ApiErr::conflict(format!("asset tag {tag} already exists")));
        }
        Some(tag) => tag.clone(),
        None => generate_asset_tag(
            &config.inventory.asset_tag_prefix,
            &req.asset_type,
            random_tag_number,
            |candidate| tag_taken(&conn, candidate),
        )?,
    };

    let id = sq_insert(&conn, assets::insert(&req, &tag))
        .map_err(ApiErr::from_write("insert asset", "asset tag already exists"))?;
    tracing::info!(asset_id = id, tag = %tag, "asset created");
    Ok((StatusCode::CREATED, Json(require_asset(&conn, id)?)))
}

/// GET /api/assets
pub async fn list_assets(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<AssetListQuery>,
) -> Result<Json<ListAssetsResponse>, ApiErr> {
    let conn = db.conn();
    let assets = sq_query_map(&conn, assets::list(&q), asset_from_row)
        .map_err(ApiErr::from_db("list assets"))?;
    Ok(Json(ListAssetsResponse { assets }))
}

/// GET /api/assets/{id}
pub async fn get_asset(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AssetResponse>, ApiErr> {
    let conn = db.conn();
    Ok(Json(require_asset(&conn, id)?))
}

/// PUT /api/assets/{id}
pub async fn update_asset(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAssetRequest>,
) -> Result<Json<AssetResponse>, ApiErr> {
    let req = UpdateAssetRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        ..req
    };
    let conn = db.conn();
    require_asset(&conn, id)?;
    check_client(&conn, req.client_id)?;
    if let Some(update) = assets::update(id, &req) {
        sq_execute(&conn, update).map_err(ApiErr::from_db("update asset"))?;
    }
    Ok(Json(require_asset(&conn, id)?))
}

/// POST /api/assets/{id}/archive
pub async fn archive_asset(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AssetResponse>, ApiErr> {
    let conn = db.conn();
    require_asset(&conn, id)?;
    sq_execute(
        &conn,
        db::set_archived(db::Assets::Table, db::Assets::Id, db::Assets::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive asset"))?;
    Ok(Json(require_asset(&conn, id)?))
}
