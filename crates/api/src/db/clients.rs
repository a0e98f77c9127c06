//! Client query builders, including the per-client contacts, locations and
//! documents.

use sea_query::{Asterisk, Expr, Func, LikeExpr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::{Clients, Contacts, Documents, Locations};
use super::{BuiltListQuery, Changes, archived_filter, now, opt_money, opt_text};
use super::Built;
use crate::service::PageWindow;
use crate::{
    CreateClientRequest, CreateContactRequest, CreateDocumentRequest, CreateLocationRequest,
    UpdateClientRequest, UpdateContactRequest, UpdateDocumentRequest, UpdateLocationRequest,
};

// ── Clients ────────────────────────────────────────────────────────────────

/// Columns: id, name, email, phone, website, net_terms, hourly_rate, notes,
/// created_at, archived_at. Must match `client_from_row()`.
fn client_select() -> SelectStatement {
    Query::select()
        .columns([
            Clients::Id,
            Clients::Name,
            Clients::Email,
            Clients::Phone,
            Clients::Website,
            Clients::NetTerms,
            Clients::HourlyRate,
            Clients::Notes,
            Clients::CreatedAt,
            Clients::ArchivedAt,
        ])
        .from(Clients::Table)
        .to_owned()
}

pub fn get(id: i64) -> Built {
    client_select()
        .and_where(Expr::col(Clients::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// `(id, name)` of every active client, oldest first.
///
/// Name matching happens in Rust with `name_key` since SQLite's `lower()`
/// only folds ASCII.
pub fn active_names() -> Built {
    Query::select()
        .columns([Clients::Id, Clients::Name])
        .from(Clients::Table)
        .and_where(Expr::col(Clients::ArchivedAt).is_null())
        .order_by(Clients::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Case-insensitive lookup key for a client name.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// `%term%` with LIKE wildcards in the term escaped by `\`.
fn contains_pattern(term: &str) -> LikeExpr {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    LikeExpr::new(escaped).escape('\\')
}

/// Paginated listing with an optional name search.
pub fn list(search: Option<&str>, archived: bool, window: PageWindow) -> BuiltListQuery {
    let mut count = Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Clients::Table)
        .and_where(archived_filter(Clients::ArchivedAt, archived))
        .to_owned();
    let mut select = client_select()
        .and_where(archived_filter(Clients::ArchivedAt, archived))
        .to_owned();

    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        count.and_where(Expr::col(Clients::Name).like(contains_pattern(search)));
        select.and_where(Expr::col(Clients::Name).like(contains_pattern(search)));
    }

    select
        .order_by(Clients::Name, Order::Asc)
        .limit(u64::from(window.per_page))
        .offset(window.offset());

    BuiltListQuery {
        count_query: count.build(SqliteQueryBuilder),
        select_query: select.build(SqliteQueryBuilder),
        page: window.page,
        per_page: window.per_page,
    }
}

pub fn insert(req: &CreateClientRequest) -> Built {
    Query::insert()
        .into_table(Clients::Table)
        .columns([
            Clients::Name,
            Clients::Email,
            Clients::Phone,
            Clients::Website,
            Clients::NetTerms,
            Clients::HourlyRate,
            Clients::Notes,
        ])
        .values_panic([
            req.name.as_str().into(),
            opt_text(req.email.as_deref()).into(),
            opt_text(req.phone.as_deref()).into(),
            opt_text(req.website.as_deref()).into(),
            req.net_terms.into(),
            opt_money(req.hourly_rate).into(),
            opt_text(req.notes.as_deref()).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update(id: i64, req: &UpdateClientRequest) -> Option<Built> {
    let mut changes = Changes::new(Clients::Table);
    changes
        .set_opt(Clients::Name, req.name.as_deref())
        .set_opt(Clients::Email, req.email.as_deref())
        .set_opt(Clients::Phone, req.phone.as_deref())
        .set_opt(Clients::Website, req.website.as_deref())
        .set_opt(Clients::NetTerms, req.net_terms)
        .set_opt(Clients::HourlyRate, req.hourly_rate.map(super::money))
        .set_opt(Clients::Notes, req.notes.as_deref());
    changes.build(Expr::col(Clients::Id).eq(id))
}

// ── Contacts ───────────────────────────────────────────────────────────────

/// Columns: id, client_id, name, title, email, phone, is_primary,
/// created_at, archived_at. Must match `contact_from_row()`.
fn contact_select() -> SelectStatement {
    Query::select()
        .columns([
            Contacts::Id,
            Contacts::ClientId,
            Contacts::Name,
            Contacts::Title,
            Contacts::Email,
            Contacts::Phone,
            Contacts::IsPrimary,
            Contacts::CreatedAt,
            Contacts::ArchivedAt,
        ])
        .from(Contacts::Table)
        .to_owned()
}

pub fn get_contact(client_id: i64, id: i64) -> Built {
    contact_select()
        .and_where(Expr::col(Contacts::Id).eq(id))
        .and_where(Expr::col(Contacts::ClientId).eq(client_id))
        .build(SqliteQueryBuilder)
}

pub fn list_contacts(client_id: i64, archived: bool) -> Built {
    contact_select()
        .and_where(Expr::col(Contacts::ClientId).eq(client_id))
        .and_where(archived_filter(Contacts::ArchivedAt, archived))
        .order_by(Contacts::IsPrimary, Order::Desc)
        .order_by(Contacts::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Email of the primary (or else first) active contact with one.
pub fn billing_contact_email(client_id: i64) -> Built {
    Query::select()
        .column(Contacts::Email)
        .from(Contacts::Table)
        .and_where(Expr::col(Contacts::ClientId).eq(client_id))
        .and_where(Expr::col(Contacts::ArchivedAt).is_null())
        .and_where(Expr::col(Contacts::Email).is_not_null())
        .order_by(Contacts::IsPrimary, Order::Desc)
        .order_by(Contacts::Id, Order::Asc)
        .limit(1)
        .build(SqliteQueryBuilder)
}

pub fn insert_contact(client_id: i64, req: &CreateContactRequest) -> Built {
    Query::insert()
        .into_table(Contacts::Table)
        .columns([
            Contacts::ClientId,
            Contacts::Name,
            Contacts::Title,
            Contacts::Email,
            Contacts::Phone,
            Contacts::IsPrimary,
        ])
        .values_panic([
            client_id.into(),
            req.name.as_str().into(),
            opt_text(req.title.as_deref()).into(),
            opt_text(req.email.as_deref()).into(),
            opt_text(req.phone.as_deref()).into(),
            req.is_primary.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_contact(id: i64, req: &UpdateContactRequest) -> Option<Built> {
    let mut changes = Changes::new(Contacts::Table);
    changes
        .set_opt(Contacts::Name, req.name.as_deref())
        .set_opt(Contacts::Title, req.title.as_deref())
        .set_opt(Contacts::Email, req.email.as_deref())
        .set_opt(Contacts::Phone, req.phone.as_deref())
        .set_opt(Contacts::IsPrimary, req.is_primary);
    changes.build(Expr::col(Contacts::Id).eq(id))
}

/// Clear the primary flag on every other contact of the client.
pub fn clear_primary_contact(client_id: i64, keep_id: i64) -> Built {
    Query::update()
        .table(Contacts::Table)
        .value(Contacts::IsPrimary, false)
        .and_where(Expr::col(Contacts::ClientId).eq(client_id))
        .and_where(Expr::col(Contacts::Id).ne(keep_id))
        .build(SqliteQueryBuilder)
}

// ── Locations ──────────────────────────────────────────────────────────────

/// Columns: id, client_id, name, address, city, state, zip, phone,
/// is_primary, created_at, archived_at. Must match `location_from_row()`.
fn location_select() -> SelectStatement {
    Query::select()
        .columns([
            Locations::Id,
            Locations::ClientId,
            Locations::Name,
            Locations::Address,
            Locations::City,
            Locations::State,
            Locations::Zip,
            Locations::Phone,
            Locations::IsPrimary,
            Locations::CreatedAt,
            Locations::ArchivedAt,
        ])
        .from(Locations::Table)
        .to_owned()
}

pub fn get_location(client_id: i64, id: i64) -> Built {
    location_select()
        .and_where(Expr::col(Locations::Id).eq(id))
        .and_where(Expr::col(Locations::ClientId).eq(client_id))
        .build(SqliteQueryBuilder)
}

pub fn list_locations(client_id: i64, archived: bool) -> Built {
    location_select()
        .and_where(Expr::col(Locations::ClientId).eq(client_id))
        .and_where(archived_filter(Locations::ArchivedAt, archived))
        .order_by(Locations::IsPrimary, Order::Desc)
        .order_by(Locations::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_location(client_id: i64, req: &CreateLocationRequest) -> Built {
    Query::insert()
        .into_table(Locations::Table)
        .columns([
            Locations::ClientId,
            Locations::Name,
            Locations::Address,
            Locations::City,
            Locations::State,
            Locations::Zip,
            Locations::Phone,
            Locations::IsPrimary,
        ])
        .values_panic([
            client_id.into(),
            req.name.as_str().into(),
            opt_text(req.address.as_deref()).into(),
            opt_text(req.city.as_deref()).into(),
            opt_text(req.state.as_deref()).into(),
            opt_text(req.zip.as_deref()).into(),
            opt_text(req.phone.as_deref()).into(),
            req.is_primary.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_location(id: i64, req: &UpdateLocationRequest) -> Option<Built> {
    let mut changes = Changes::new(Locations::Table);
    changes
        .set_opt(Locations::Name, req.name.as_deref())
        .set_opt(Locations::Address, req.address.as_deref())
        .set_opt(Locations::City, req.city.as_deref())
        .set_opt(Locations::State, req.state.as_deref())
        .set_opt(Locations::Zip, req.zip.as_deref())
        .set_opt(Locations::Phone, req.phone.as_deref())
        .set_opt(Locations::IsPrimary, req.is_primary);
    changes.build(Expr::col(Locations::Id).eq(id))
}

pub fn clear_primary_location(client_id: i64, keep_id: i64) -> Built {
    Query::update()
        .table(Locations::Table)
        .value(Locations::IsPrimary, false)
        .and_where(Expr::col(Locations::ClientId).eq(client_id))
        .and_where(Expr::col(Locations::Id).ne(keep_id))
        .build(SqliteQueryBuilder)
}

// ── Documents ──────────────────────────────────────────────────────────────

/// Columns: id, client_id, name, content, created_at, updated_at,
/// archived_at. Must match `document_from_row()`.
fn document_select() -> SelectStatement {
    Query::select()
        .columns([
            Documents::Id,
            Documents::ClientId,
            Documents::Name,
            Documents::Content,
            Documents::CreatedAt,
            Documents::UpdatedAt,
            Documents::ArchivedAt,
        ])
        .from(Documents::Table)
        .to_owned()
}

pub fn get_document(client_id: i64, id: i64) -> Built {
    document_select()
        .and_where(Expr::col(Documents::Id).eq(id))
        .and_where(Expr::col(Documents::ClientId).eq(client_id))
        .build(SqliteQueryBuilder)
}

pub fn list_documents(client_id: i64, archived: bool) -> Built {
    document_select()
        .and_where(Expr::col(Documents::ClientId).eq(client_id))
        .and_where(archived_filter(Documents::ArchivedAt, archived))
        .order_by(Documents::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_document(client_id: i64, req: &CreateDocumentRequest) -> Built {
    Query::insert()
        .into_table(Documents::Table)
        .columns([Documents::ClientId, Documents::Name, Documents::Content])
        .values_panic([
            client_id.into(),
            req.name.as_str().into(),
            req.content.as_str().into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_document(id: i64, req: &UpdateDocumentRequest) -> Built {
    let mut changes = Changes::new(Documents::Table);
    changes
        .set(Documents::UpdatedAt, now())
        .set_opt(Documents::Name, req.name.as_deref())
        .set_opt(Documents::Content, req.content.as_deref());
    changes.build_always(Expr::col(Documents::Id).eq(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_and_paginates() {
        let q = list(Some("acme"), false, PageWindow::new(Some(2), Some(10)));
        let (count_sql, count_values) = q.count_query;
        let (sql, values) = q.select_query;
        assert!(count_sql.contains(r#""archived_at" IS NULL"#));
        assert!(count_sql.contains(r#""name" LIKE ? ESCAPE '\'"#));
        assert_eq!(count_values.0.len(), 1);
        assert!(sql.contains(r#"ORDER BY "name" ASC"#));
        assert!(sql.contains("LIMIT ? OFFSET ?"));
        assert_eq!(values.0.len(), 3);
        assert_eq!(values.0[0], sea_query::Value::from("%acme%"));
        assert_eq!((q.page, q.per_page), (2, 10));
    }

    #[test]
    fn blank_search_is_ignored() {
        let q = list(Some("  "), true, PageWindow::new(None, None));
        assert!(!q.select_query.0.contains("LIKE"));
        assert!(q.select_query.0.contains(r#""archived_at" IS NOT NULL"#));
    }

    #[test]
    fn search_wildcards_are_literal() {
        let q = list(Some("50%_off"), false, PageWindow::new(None, None));
        assert_eq!(
            q.select_query.1.0[0],
            sea_query::Value::from(r"%50\%\_off%")
        );
    }

    #[test]
    fn name_key_folds_unicode() {
        assert_eq!(name_key(" ÉCOLE Ünited "), name_key("école ünited"));
        assert_eq!(name_key("Acme Corp"), "acme corp");
    }

    #[test]
    fn document_update_touches_timestamp() {
        let (sql, _) = update_document(3, &UpdateDocumentRequest::default());
        assert_eq!(
            sql,
            r#"UPDATE "documents" SET "updated_at" = datetime('now') WHERE "id" = ?"#
        );
    }
}
