//! Taxes, categories and products.

use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::{Categories, Products, Taxes};
use super::{Built, Changes, archived_filter, money, opt_text};
use crate::{CategoryType, CreateCategoryRequest, CreateProductRequest, UpdateProductRequest};

// ── Taxes ──────────────────────────────────────────────────────────────────

/// Columns: id, name, percent, archived_at.
fn tax_select() -> SelectStatement {
    Query::select()
        .columns([Taxes::Id, Taxes::Name, Taxes::Percent, Taxes::ArchivedAt])
        .from(Taxes::Table)
        .to_owned()
}

pub fn get_tax(id: i64) -> Built {
    tax_select()
        .and_where(Expr::col(Taxes::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list_taxes(archived: bool) -> Built {
    tax_select()
        .and_where(archived_filter(Taxes::ArchivedAt, archived))
        .order_by(Taxes::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_tax(name: &str, percent: rust_decimal::Decimal) -> Built {
    Query::insert()
        .into_table(Taxes::Table)
        .columns([Taxes::Name, Taxes::Percent])
        .values_panic([name.into(), money(percent).into()])
        .build(SqliteQueryBuilder)
}

// ── Categories ─────────────────────────────────────────────────────────────

/// Columns: id, name, category_type, color, archived_at.
fn category_select() -> SelectStatement {
    Query::select()
        .columns([
            Categories::Id,
            Categories::Name,
            Categories::CategoryType,
            Categories::Color,
            Categories::ArchivedAt,
        ])
        .from(Categories::Table)
        .to_owned()
}

pub fn get_category(id: i64) -> Built {
    category_select()
        .and_where(Expr::col(Categories::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list_categories(category_type: Option<CategoryType>, archived: bool) -> Built {
    let mut q = category_select()
        .and_where(archived_filter(Categories::ArchivedAt, archived))
        .to_owned();
    if let Some(t) = category_type {
        q.and_where(Expr::col(Categories::CategoryType).eq(t.as_str()));
    }
    q.order_by(Categories::CategoryType, Order::Asc)
        .order_by(Categories::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_category(req: &CreateCategoryRequest) -> Built {
    Query::insert()
        .into_table(Categories::Table)
        .columns([Categories::Name, Categories::CategoryType, Categories::Color])
        .values_panic([
            req.name.as_str().into(),
            req.category_type.as_str().into(),
            opt_text(req.color.as_deref()).into(),
        ])
        .build(SqliteQueryBuilder)
}

// ── Products ───────────────────────────────────────────────────────────────

/// Columns: id, name, description, price, tax_id, category_id, archived_at.
/// Must match `product_from_row()`.
fn product_select() -> SelectStatement {
    Query::select()
        .columns([
            Products::Id,
            Products::Name,
            Products::Description,
            Products::Price,
            Products::TaxId,
            Products::CategoryId,
            Products::ArchivedAt,
        ])
        .from(Products::Table)
        .to_owned()
}

pub fn get_product(id: i64) -> Built {
    product_select()
        .and_where(Expr::col(Products::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list_products(archived: bool) -> Built {
    product_select()
        .and_where(archived_filter(Products::ArchivedAt, archived))
        .order_by(Products::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_product(req: &CreateProductRequest) -> Built {
    Query::insert()
        .into_table(Products::Table)
        .columns([
            Products::Name,
            Products::Description,
            Products::Price,
            Products::TaxId,
            Products::CategoryId,
        ])
        .values_panic([
            req.name.as_str().into(),
            opt_text(req.description.as_deref()).into(),
            money(req.price).into(),
            req.tax_id.into(),
            req.category_id.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_product(id: i64, req: &UpdateProductRequest) -> Option<Built> {
    let mut changes = Changes::new(Products::Table);
    changes
        .set_opt(Products::Name, req.name.as_deref())
        .set_opt(Products::Description, req.description.as_deref())
        .set_opt(Products::Price, req.price.map(money))
        .set_opt(Products::TaxId, req.tax_id)
        .set_opt(Products::CategoryId, req.category_id);
    changes.build(Expr::col(Products::Id).eq(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_filter_by_type() {
        let (sql, values) = list_categories(Some(CategoryType::Expense), false);
        assert!(sql.contains(r#""category_type" = ?"#));
        assert_eq!(values.0, vec![sea_query::Value::from("expense")]);

        let (sql, values) = list_categories(None, false);
        assert!(!sql.contains(r#""category_type" = ?"#));
        assert!(values.0.is_empty());
    }

    #[test]
    fn money_is_stored_as_text() {
        let (_, values) = insert_tax("State", "8.25".parse().unwrap());
        assert_eq!(values.0[1], sea_query::Value::from("8.25"));
    }
}
