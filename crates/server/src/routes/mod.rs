pub mod assets;
pub mod auth;
pub mod banking;
pub mod catalog;
pub mod clients;
pub mod email;
pub mod health;
pub mod hr;
pub mod invoices;
pub mod projects;
pub mod quotes;
pub mod recurring;
pub mod reports;
pub mod tickets;

use chrono::{NaiveDate, Utc};

use crate::error::ApiErr;

/// Current UTC date.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Turn a missing row into `404 <what> not found`.
pub(crate) fn found<T>(row: Option<T>, what: &str) -> Result<T, ApiErr> {
    row.ok_or_else(|| ApiErr::not_found(format!("{what} not found")))
}
