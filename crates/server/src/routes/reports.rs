use axum::{
    Json,
    extract::{Query, State},
};

use ledgerdesk_api::{AgingQuery, AgingResponse};

use crate::accounting::compute_aging;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::clients::require_client;
use crate::routes::today;
use crate::storage::Db;

/// GET /api/reports/aging?client_id=&as_of= - open receivables by days past due.
pub async fn aging(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<AgingQuery>,
) -> Result<Json<AgingResponse>, ApiErr> {
    let as_of = q.as_of.unwrap_or_else(today);
    let conn = db.conn();
    if let Some(client_id) = q.client_id {
        require_client(&conn, client_id)?;
    }
    let report = compute_aging(&conn, q.client_id, as_of).map_err(ApiErr::from_db("aging report"))?;
    Ok(Json(AgingResponse {
        as_of,
        client_id: q.client_id,
        report,
    }))
}
