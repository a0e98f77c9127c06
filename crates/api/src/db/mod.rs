//! Shared database schema, migrations, and query builders.
//!
//! Every builder returns a [`Built`] pair that the server binds and executes.
//! Select builders document their column order; the server's row mappers
//! read columns positionally.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sea_query::{
    Expr, IntoColumnRef, IntoIden, IntoTableRef, Query, SimpleExpr, SqliteQueryBuilder,
    UpdateStatement,
};

pub mod assets;
pub mod banking;
pub mod billing;
pub mod catalog;
pub mod clients;
pub mod email;
pub mod hr;
pub mod migrations;
pub mod recurring;
pub mod support;
pub mod tables;
pub mod users;

// Re-export tables for convenience
pub use tables::*;

pub type Built = (String, sea_query::Values);

/// Storage format of timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Value encoders ─────────────────────────────────────────────────────────

pub(crate) fn money(value: Decimal) -> sea_query::Value {
    value.to_string().into()
}

pub(crate) fn opt_money(value: Option<Decimal>) -> sea_query::Value {
    value.map(|v| v.to_string()).into()
}

pub(crate) fn date(value: NaiveDate) -> sea_query::Value {
    value.format("%Y-%m-%d").to_string().into()
}

pub(crate) fn opt_date(value: Option<NaiveDate>) -> sea_query::Value {
    value.map(|v| v.format("%Y-%m-%d").to_string()).into()
}

pub(crate) fn timestamp(value: NaiveDateTime) -> sea_query::Value {
    value.format(TIMESTAMP_FORMAT).to_string().into()
}

pub(crate) fn opt_text(value: Option<&str>) -> sea_query::Value {
    value.map(str::to_string).into()
}

pub(crate) fn now() -> SimpleExpr {
    Expr::cust("datetime('now')")
}

// ── Shared fragments ───────────────────────────────────────────────────────

/// `archived_at IS NOT NULL` when listing archived rows, `IS NULL` otherwise.
pub(crate) fn archived_filter<C: IntoColumnRef>(column: C, archived: bool) -> SimpleExpr {
    if archived {
        Expr::col(column).is_not_null()
    } else {
        Expr::col(column).is_null()
    }
}

/// Set or clear the archive timestamp of one row.
pub fn set_archived<T, C>(table: T, id_col: C, archived_col: C, id: i64, archived: bool) -> Built
where
    T: IntoTableRef,
    C: IntoIden + 'static,
{
    let value: SimpleExpr = if archived {
        now()
    } else {
        Option::<String>::None.into()
    };
    Query::update()
        .table(table)
        .value(archived_col, value)
        .and_where(Expr::col(id_col).eq(id))
        .build(SqliteQueryBuilder)
}

/// Partial UPDATE built from optional fields.
pub(crate) struct Changes {
    stmt: UpdateStatement,
    count: usize,
}

impl Changes {
    pub(crate) fn new<T: IntoTableRef>(table: T) -> Self {
        let mut stmt = Query::update();
        stmt.table(table);
        Self { stmt, count: 0 }
    }

    pub(crate) fn set<C: IntoIden>(&mut self, col: C, value: impl Into<SimpleExpr>) -> &mut Self {
        self.stmt.value(col, value);
        self.count += 1;
        self
    }

    pub(crate) fn set_opt<C, V>(&mut self, col: C, value: Option<V>) -> &mut Self
    where
        C: IntoIden,
        V: Into<SimpleExpr>,
    {
        if let Some(value) = value {
            self.set(col, value);
        }
        self
    }

    /// `None` when no field was set.
    pub(crate) fn build(mut self, filter: SimpleExpr) -> Option<Built> {
        if self.count == 0 {
            return None;
        }
        Some(self.stmt.and_where(filter).build(SqliteQueryBuilder))
    }

    /// Always produces a statement; callers set a timestamp first.
    pub(crate) fn build_always(mut self, filter: SimpleExpr) -> Built {
        self.stmt.and_where(filter).build(SqliteQueryBuilder)
    }
}

/// Paginated listing: a `COUNT(*)` query plus the page itself.
pub struct BuiltListQuery {
    pub count_query: Built,
    pub select_query: Built,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_and_unarchive() {
        let (sql, values) = set_archived(Clients::Table, Clients::Id, Clients::ArchivedAt, 7, true);
        assert_eq!(
            sql,
            r#"UPDATE "clients" SET "archived_at" = datetime('now') WHERE "id" = ?"#
        );
        assert_eq!(values.0.len(), 1);

        let (sql, values) = set_archived(Clients::Table, Clients::Id, Clients::ArchivedAt, 7, false);
        assert_eq!(sql, r#"UPDATE "clients" SET "archived_at" = ? WHERE "id" = ?"#);
        assert_eq!(values.0.len(), 2);
    }

    #[test]
    fn changes_skip_empty_updates() {
        let empty = Changes::new(Clients::Table);
        assert!(empty.build(Expr::col(Clients::Id).eq(1)).is_none());

        let mut changes = Changes::new(Clients::Table);
        changes
            .set_opt(Clients::Name, Some("Acme"))
            .set_opt(Clients::Email, Option::<String>::None);
        let (sql, _) = changes.build(Expr::col(Clients::Id).eq(1)).unwrap();
        assert_eq!(sql, r#"UPDATE "clients" SET "name" = ? WHERE "id" = ?"#);
    }

    #[test]
    fn migrations_are_named_and_ordered() {
        let names: Vec<&str> = migrations::MIGRATIONS.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["0001_schema"]);
        assert!(migrations::MIGRATIONS[0].1.contains("CREATE TABLE IF NOT EXISTS email_queue"));
    }
}
