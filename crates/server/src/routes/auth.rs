use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, request::Parts},
};

use ledgerdesk_api::db::users;
use ledgerdesk_api::{
    CreateUserRequest, CreateUserResponse, ListUsersResponse, UserResponse, UserRole, service,
};

use crate::error::ApiErr;
use crate::storage::{Db, scalar_i64, sq_find, sq_insert, sq_query_map, sq_query_row, user_from_row};

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Authenticated user extracted from the `Authorization: Bearer <api_key>` header.
pub struct AuthUser {
    pub user: UserResponse,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn require_admin(&self) -> Result<(), ApiErr> {
        if self.user.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiErr::forbidden("admin only"))
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Db::from_ref(state);

        let api_key = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiErr::unauthorized("missing or invalid Authorization header"))?;

        let key_hash = service::hash_api_key(api_key);
        let conn = db.conn();
        let user = sq_find(&conn, users::get_by_key_hash(&key_hash), user_from_row)
            .map_err(ApiErr::from_db("auth lookup"))?
            .ok_or_else(|| ApiErr::unauthorized("invalid API key"))?;
        Ok(AuthUser { user })
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Insert a user with a freshly generated key. Returns the user and the
/// plaintext key, which is never stored.
pub fn create_user_with_key(
    conn: &rusqlite::Connection,
    name: &str,
    email: &str,
    role: UserRole,
    api_key: &str,
) -> Result<UserResponse, ApiErr> {
    let id = sq_insert(
        conn,
        users::insert(name, email, role, &service::hash_api_key(api_key)),
    )
    .map_err(ApiErr::from_write("insert user", "email already registered"))?;
    sq_query_row(conn, users::get(id), user_from_row).map_err(ApiErr::from_db("load user"))
}

/// Create the first admin from a bootstrap key when no user exists yet.
/// Returns whether a user was created.
pub fn bootstrap_admin(db: &Db, api_key: &str) -> anyhow::Result<bool> {
    let conn = db.conn();
    let existing = scalar_i64(&conn, users::count())?.unwrap_or(0);
    if existing > 0 {
        return Ok(false);
    }
    sq_insert(
        &conn,
        users::insert(
            "Administrator",
            "admin@localhost",
            UserRole::Admin,
            &service::hash_api_key(api_key),
        ),
    )?;
    Ok(true)
}

/// POST /api/users - create a user (admin only). The API key is returned once.
pub async fn create_user(
    State(db): State<Db>,
    auth: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiErr> {
    auth.require_admin()?;
    let name = service::validate_name("name", &req.name, 100)?;
    let email = service::validate_email(&req.email)?;
    let role = req.role.unwrap_or(UserRole::Staff);
    let api_key = service::generate_api_key();

    let conn = db.conn();
    let user = create_user_with_key(&conn, &name, &email, role, &api_key)?;
    tracing::info!(user_id = user.id, role = %role, "user created");

    Ok((StatusCode::CREATED, Json(CreateUserResponse { user, api_key })))
}

/// GET /api/users - list all users.
pub async fn list_users(
    State(db): State<Db>,
    _auth: AuthUser,
) -> Result<Json<ListUsersResponse>, ApiErr> {
    let conn = db.conn();
    let users = sq_query_map(&conn, users::list(), user_from_row)
        .map_err(ApiErr::from_db("list users"))?;
    Ok(Json(ListUsersResponse { users }))
}

/// GET /api/users/me - the authenticated user.
pub async fn me(auth: AuthUser) -> Json<UserResponse> {
    Json(auth.user)
}
