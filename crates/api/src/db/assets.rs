use sea_query::{Asterisk, Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::Assets;
use super::{Built, Changes, archived_filter, date, opt_date, opt_text};
use crate::{AssetListQuery, CreateAssetRequest, UpdateAssetRequest};

/// Columns: id, client_id, tag, name, asset_type, make, model, serial,
/// purchase_date, notes, created_at, archived_at. Must match `asset_from_row()`.
fn asset_select() -> SelectStatement {
    Query::select()
        .columns([
            Assets::Id,
            Assets::ClientId,
            Assets::Tag,
            Assets::Name,
            Assets::AssetType,
            Assets::Make,
            Assets::Model,
            Assets::Serial,
            Assets::PurchaseDate,
            Assets::Notes,
            Assets::CreatedAt,
            Assets::ArchivedAt,
        ])
        .from(Assets::Table)
        .to_owned()
}

pub fn get(id: i64) -> Built {
    asset_select()
        .and_where(Expr::col(Assets::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn list(q: &AssetListQuery) -> Built {
    let mut select = asset_select()
        .and_where(archived_filter(Assets::ArchivedAt, q.archived))
        .to_owned();
    if let Some(client_id) = q.client_id {
        select.and_where(Expr::col(Assets::ClientId).eq(client_id));
    }
    select
        .order_by(Assets::Tag, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// `SELECT COUNT(*)` of rows holding `tag`.
pub fn tag_exists(tag: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Assets::Table)
        .and_where(Expr::col(Assets::Tag).eq(tag))
        .build(SqliteQueryBuilder)
}

pub fn insert(req: &CreateAssetRequest, tag: &str) -> Built {
    Query::insert()
        .into_table(Assets::Table)
        .columns([
            Assets::ClientId,
            Assets::Tag,
            Assets::Name,
            Assets::AssetType,
            Assets::Make,
            Assets::Model,
            Assets::Serial,
            Assets::PurchaseDate,
            Assets::Notes,
        ])
        .values_panic([
            req.client_id.into(),
            tag.into(),
            req.name.as_str().into(),
            req.asset_type.as_str().into(),
            opt_text(req.make.as_deref()).into(),
            opt_text(req.model.as_deref()).into(),
            opt_text(req.serial.as_deref()).into(),
            opt_date(req.purchase_date).into(),
            opt_text(req.notes.as_deref()).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update(id: i64, req: &UpdateAssetRequest) -> Option<Built> {
    let mut changes = Changes::new(Assets::Table);
    changes
        .set_opt(Assets::Name, req.name.as_deref())
        .set_opt(Assets::ClientId, req.client_id)
        .set_opt(Assets::Make, req.make.as_deref())
        .set_opt(Assets::Model, req.model.as_deref())
        .set_opt(Assets::Serial, req.serial.as_deref())
        .set_opt(Assets::PurchaseDate, req.purchase_date.map(date))
        .set_opt(Assets::Notes, req.notes.as_deref());
    changes.build(Expr::col(Assets::Id).eq(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_by_client() {
        let q = AssetListQuery {
            client_id: Some(9),
            archived: false,
        };
        let (sql, values) = list(&q);
        assert!(sql.contains(r#""archived_at" IS NULL AND "client_id" = ?"#));
        assert_eq!(values.0.len(), 1);
    }

    #[test]
    fn tag_lookup_counts() {
        let (sql, _) = tag_exists("MSP-LAP-000001");
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "assets" WHERE "tag" = ?"#);
    }
}
