//! User / auth query builders.

use sea_query::{Asterisk, Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::Built;
use super::tables::Users;
use crate::UserRole;

/// Columns: id, name, email, role, created_at.
fn user_select() -> SelectStatement {
    Query::select()
        .columns([
            Users::Id,
            Users::Name,
            Users::Email,
            Users::Role,
            Users::CreatedAt,
        ])
        .from(Users::Table)
        .to_owned()
}

/// Look up the owner of an API key by its hash.
pub fn get_by_key_hash(key_hash: &str) -> Built {
    user_select()
        .and_where(Expr::col(Users::ApiKeyHash).eq(key_hash))
        .build(SqliteQueryBuilder)
}

pub fn get(id: i64) -> Built {
    user_select()
        .and_where(Expr::col(Users::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list() -> Built {
    user_select()
        .order_by(Users::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn count() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Users::Table)
        .build(SqliteQueryBuilder)
}

pub fn email_exists(email: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

pub fn insert(name: &str, email: &str, role: UserRole, key_hash: &str) -> Built {
    Query::insert()
        .into_table(Users::Table)
        .columns([Users::Name, Users::Email, Users::Role, Users::ApiKeyHash])
        .values_panic([
            name.into(),
            email.into(),
            role.as_str().into(),
            key_hash.into(),
        ])
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_hash_is_parameterized() {
        let (sql, values) = get_by_key_hash("abc");
        assert!(sql.starts_with(r#"SELECT "id", "name", "email", "role", "created_at" FROM "users""#));
        assert!(sql.ends_with(r#"WHERE "api_key_hash" = ?"#));
        assert_eq!(values.0.len(), 1);
    }

    #[test]
    fn insert_stores_role_text() {
        let (sql, values) = insert("Ada", "ada@example.com", UserRole::Admin, "h");
        assert!(sql.starts_with(r#"INSERT INTO "users" ("name", "email", "role", "api_key_hash")"#));
        assert_eq!(values.0[2], sea_query::Value::from("admin"));
    }
}
