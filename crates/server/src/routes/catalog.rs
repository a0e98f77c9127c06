use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use ledgerdesk_api::db::{self, catalog};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    ArchivedQuery, CategoryListQuery, CategoryResponse, CreateCategoryRequest,
    CreateProductRequest, CreateTaxRequest, ListCategoriesResponse, ListProductsResponse,
    ListTaxesResponse, ProductResponse, TaxResponse, UpdateProductRequest,
};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::found;
use crate::storage::{
    Db, category_from_row, product_from_row, sq_execute, sq_find, sq_insert, sq_query_map,
    tax_from_row,
};

pub(crate) fn find_tax(conn: &Connection, id: i64) -> Result<Option<TaxResponse>, ApiErr> {
    sq_find(conn, catalog::get_tax(id), tax_from_row).map_err(ApiErr::from_db("get tax"))
}

pub(crate) fn find_product(conn: &Connection, id: i64) -> Result<Option<ProductResponse>, ApiErr> {
    sq_find(conn, catalog::get_product(id), product_from_row).map_err(ApiErr::from_db("get product"))
}

/// References in a request body are bad input, not missing resources.
fn check_refs(conn: &Connection, tax_id: Option<i64>, category_id: Option<i64>) -> Result<(), ApiErr> {
    if let Some(tax_id) = tax_id {
        if find_tax(conn, tax_id)?.is_none() {
            return Err(ApiErr::bad_request(format!("unknown tax {tax_id}")));
        }
    }
    if let Some(category_id) = category_id {
        let category = sq_find(conn, catalog::get_category(category_id), category_from_row)
            .map_err(ApiErr::from_db("get category"))?;
        if category.is_none() {
            return Err(ApiErr::bad_request(format!("unknown category {category_id}")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Taxes
// ---------------------------------------------------------------------------

/// POST /api/taxes
pub async fn create_tax(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateTaxRequest>,
) -> Result<(StatusCode, Json<TaxResponse>), ApiErr> {
    let name = service::validate_name("name", &req.name, 100)?;
    let percent = service::validate_percent(req.percent)?;
    let conn = db.conn();
    let id = sq_insert(&conn, catalog::insert_tax(&name, percent))
        .map_err(ApiErr::from_db("insert tax"))?;
    let tax = found(find_tax(&conn, id)?, "tax")?;
    Ok((StatusCode::CREATED, Json(tax)))
}

/// GET /api/taxes
pub async fn list_taxes(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListTaxesResponse>, ApiErr> {
    let conn = db.conn();
    let taxes = sq_query_map(&conn, catalog::list_taxes(q.archived), tax_from_row)
        .map_err(ApiErr::from_db("list taxes"))?;
    Ok(Json(ListTaxesResponse { taxes }))
}

/// POST /api/taxes/{id}/archive
pub async fn archive_tax(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<TaxResponse>, ApiErr> {
    let conn = db.conn();
    let changed = sq_execute(
        &conn,
        db::set_archived(db::Taxes::Table, db::Taxes::Id, db::Taxes::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive tax"))?;
    if changed == 0 {
        return Err(ApiErr::not_found("tax not found"));
    }
    Ok(Json(found(find_tax(&conn, id)?, "tax")?))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// POST /api/categories
pub async fn create_category(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiErr> {
    let req = CreateCategoryRequest {
        name: service::validate_name("name", &req.name, 100)?,
        category_type: req.category_type,
        color: service::optional_text(req.color),
    };
    let conn = db.conn();
    let id = sq_insert(&conn, catalog::insert_category(&req))
        .map_err(ApiErr::from_db("insert category"))?;
    let category = sq_find(&conn, catalog::get_category(id), category_from_row)
        .map_err(ApiErr::from_db("get category"))?;
    Ok((StatusCode::CREATED, Json(found(category, "category")?)))
}

/// GET /api/categories?type=expense
pub async fn list_categories(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<CategoryListQuery>,
) -> Result<Json<ListCategoriesResponse>, ApiErr> {
    let conn = db.conn();
    let categories = sq_query_map(
        &conn,
        catalog::list_categories(q.category_type, q.archived),
        category_from_row,
    )
    .map_err(ApiErr::from_db("list categories"))?;
    Ok(Json(ListCategoriesResponse { categories }))
}

/// POST /api/categories/{id}/archive
pub async fn archive_category(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<CategoryResponse>, ApiErr> {
    let conn = db.conn();
    sq_execute(
        &conn,
        db::set_archived(db::Categories::Table, db::Categories::Id, db::Categories::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive category"))?;
    let category = sq_find(&conn, catalog::get_category(id), category_from_row)
        .map_err(ApiErr::from_db("get category"))?;
    Ok(Json(found(category, "category")?))
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// POST /api/products
pub async fn create_product(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiErr> {
    let req = CreateProductRequest {
        name: service::validate_name("name", &req.name, 200)?,
        description: service::optional_text(req.description),
        price: service::validate_non_negative("price", req.price)?,
        tax_id: req.tax_id,
        category_id: req.category_id,
    };
    let conn = db.conn();
    check_refs(&conn, req.tax_id, req.category_id)?;
    let id = sq_insert(&conn, catalog::insert_product(&req))
        .map_err(ApiErr::from_db("insert product"))?;
    Ok((StatusCode::CREATED, Json(found(find_product(&conn, id)?, "product")?)))
}

/// GET /api/products
pub async fn list_products(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListProductsResponse>, ApiErr> {
    let conn = db.conn();
    let products = sq_query_map(&conn, catalog::list_products(q.archived), product_from_row)
        .map_err(ApiErr::from_db("list products"))?;
    Ok(Json(ListProductsResponse { products }))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiErr> {
    let conn = db.conn();
    Ok(Json(found(find_product(&conn, id)?, "product")?))
}

/// PUT /api/products/{id}
pub async fn update_product(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiErr> {
    let req = UpdateProductRequest {
        name: req
            .name
            .map(|n| service::validate_name("name", &n, 200))
            .transpose()?,
        price: req
            .price
            .map(|p| service::validate_non_negative("price", p))
            .transpose()?,
        ..req
    };
    let conn = db.conn();
    found(find_product(&conn, id)?, "product")?;
    check_refs(&conn, req.tax_id, req.category_id)?;
    if let Some(update) = catalog::update_product(id, &req) {
        sq_execute(&conn, update).map_err(ApiErr::from_db("update product"))?;
    }
    Ok(Json(found(find_product(&conn, id)?, "product")?))
}

/// POST /api/products/{id}/archive
pub async fn archive_product(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiErr> {
    let conn = db.conn();
    sq_execute(
        &conn,
        db::set_archived(db::Products::Table, db::Products::Id, db::Products::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive product"))?;
    Ok(Json(found(find_product(&conn, id)?, "product")?))
}
