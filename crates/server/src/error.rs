use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use ledgerdesk_api::{ApiError, ImportErrorResponse, RowError, ServiceError};

use crate::plaid::PlaidError;

/// Unified API error type.
///
/// Produces `{"error": "<message>"}` JSON responses. A rejected import also
/// carries its row-numbered problems.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    rows: Option<Vec<RowError>>,
}

impl ApiErr {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            rows: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    /// 422 listing the rows that failed validation.
    pub fn rejected_rows(msg: impl Into<String>, rows: Vec<RowError>) -> Self {
        Self {
            rows: Some(rows),
            ..Self::unprocessable(msg)
        }
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Build a closure that logs a DB/IO error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e}");
            Self::internal("internal server error")
        }
    }

    /// Like [`ApiErr::from_db`], but a constraint violation becomes `409`
    /// with `conflict_msg`.
    pub fn from_write<'a>(
        context: &'a str,
        conflict_msg: &'a str,
    ) -> impl FnOnce(rusqlite::Error) -> Self + 'a {
        move |e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::conflict(conflict_msg)
            }
            other => Self::from_db(context)(other),
        }
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        if let ServiceError::Internal(detail) = &e {
            tracing::error!("{detail}");
            return Self::internal("internal server error");
        }
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.message())
    }
}

impl From<ledgerdesk_core::CoreError> for ApiErr {
    fn from(e: ledgerdesk_core::CoreError) -> Self {
        ServiceError::from(e).into()
    }
}

impl From<PlaidError> for ApiErr {
    fn from(e: PlaidError) -> Self {
        match e {
            PlaidError::NotConfigured => Self::bad_request(e.to_string()),
            other => {
                tracing::warn!("plaid: {other}");
                Self::bad_gateway("bank data provider request failed")
            }
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        match self.rows {
            Some(rows) => (
                self.status,
                Json(ImportErrorResponse {
                    error: self.message,
                    rows,
                }),
            )
                .into_response(),
            None => (self.status, Json(ApiError { error: self.message })).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_keep_status_and_message() {
        let err: ApiErr = ServiceError::Conflict("already invoiced".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message, "already invoiced");

        let err: ApiErr = ServiceError::Internal("disk on fire".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal server error");
    }

    #[test]
    fn core_errors_are_bad_requests() {
        let err: ApiErr = ledgerdesk_core::CoreError::InvalidDuration("9:99".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn constraint_violations_become_conflicts() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let e = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        let err = ApiErr::from_write("insert t", "duplicate")(e);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message, "duplicate");
    }

    #[test]
    fn plaid_failures_map_to_gateway_errors() {
        let err: ApiErr = PlaidError::NotConfigured.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: ApiErr = PlaidError::Api {
            status: 400,
            body: "INVALID_PUBLIC_TOKEN".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.message.contains("INVALID_PUBLIC_TOKEN"));
    }

    #[test]
    fn rejected_rows_are_unprocessable() {
        let err = ApiErr::rejected_rows("import rejected", vec![RowError::new(3, "bad amount")]);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
