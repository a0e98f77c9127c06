//! Business arithmetic shared by the ledgerdesk server: document totals,
//! receivable aging, recurring schedules, pay periods, asset tags and CSV
//! import parsing. Nothing in here touches the database.

pub mod aging;
pub mod asset_tag;
pub mod billing;
mod error;
pub mod import;
pub mod money;
pub mod payroll;
pub mod recurring;
pub mod worktime;

pub use error::CoreError;
