//! Document totals, client balances and receivable aging.
//!
//! The `compute_*` functions read straight from SQLite and may run inside a
//! transaction. [`Accounting`] wraps them with the totals cache.

use chrono::NaiveDate;
use rusqlite::Connection;

use ledgerdesk_api::db::billing::{self, ItemOwner};
use ledgerdesk_api::{AgingReport, ClientBalance, DocumentTotals};
use ledgerdesk_core::aging::OpenBalance;
use ledgerdesk_core::billing::document_totals;
use ledgerdesk_runtime_config::CacheSettings;

use crate::cache::{TotalsCache, client_balance_key, invoice_totals_key, quote_totals_key};
use crate::error::ApiErr;
use crate::storage::{
    Db, invoice_from_row, item_from_row, line_item, quote_from_row, sq_find, sq_query_map,
    sum_decimals,
};

/// Totals of one invoice, `None` when it does not exist.
pub fn compute_invoice_totals(
    conn: &Connection,
    invoice_id: i64,
) -> rusqlite::Result<Option<DocumentTotals>> {
    let Some(invoice) = sq_find(conn, billing::get_invoice(invoice_id), invoice_from_row)? else {
        return Ok(None);
    };
    let items = sq_query_map(conn, billing::list_items(ItemOwner::Invoice(invoice_id)), item_from_row)?;
    let lines: Vec<_> = items.iter().map(line_item).collect();
    let paid = sum_decimals(conn, billing::payment_amounts(invoice_id))?;
    Ok(Some(document_totals(&lines, invoice.discount, paid)))
}

pub fn compute_quote_totals(
    conn: &Connection,
    quote_id: i64,
) -> rusqlite::Result<Option<DocumentTotals>> {
    let Some(quote) = sq_find(conn, billing::get_quote(quote_id), quote_from_row)? else {
        return Ok(None);
    };
    let items = sq_query_map(conn, billing::list_items(ItemOwner::Quote(quote_id)), item_from_row)?;
    let lines: Vec<_> = items.iter().map(line_item).collect();
    Ok(Some(document_totals(&lines, quote.discount, Default::default())))
}

/// Open balances of receivable invoices, optionally for one client.
fn open_balances(
    conn: &Connection,
    client_id: Option<i64>,
) -> rusqlite::Result<Vec<(DocumentTotals, OpenBalance)>> {
    let receivable = sq_query_map(conn, billing::receivable_invoices(client_id), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, NaiveDate>(2)?))
    })?;
    let mut out = Vec::with_capacity(receivable.len());
    for (id, due_date) in receivable {
        if let Some(totals) = compute_invoice_totals(conn, id)? {
            let open = OpenBalance {
                due_date,
                balance: totals.balance,
            };
            out.push((totals, open));
        }
    }
    Ok(out)
}

pub fn compute_client_balance(
    conn: &Connection,
    client_id: i64,
    today: NaiveDate,
) -> rusqlite::Result<ClientBalance> {
    let open = open_balances(conn, Some(client_id))?;
    let invoiced = open.iter().map(|(t, _)| t.total).sum();
    let paid = open.iter().map(|(t, _)| t.paid).sum();
    let balance = open.iter().map(|(t, _)| t.balance).sum();
    Ok(ClientBalance {
        client_id,
        invoiced,
        paid,
        balance,
        aging: AgingReport::build(today, open.iter().map(|(_, o)| o)),
    })
}

pub fn compute_aging(
    conn: &Connection,
    client_id: Option<i64>,
    today: NaiveDate,
) -> rusqlite::Result<AgingReport> {
    let open = open_balances(conn, client_id)?;
    Ok(AgingReport::build(today, open.iter().map(|(_, o)| o)))
}

/// Cached accounting reads.
#[derive(Clone)]
pub struct Accounting {
    db: Db,
    cache: TotalsCache,
    invoice_ttl_secs: u64,
    balance_ttl_secs: u64,
}

impl Accounting {
    pub fn new(db: Db, cache: TotalsCache, settings: &CacheSettings) -> Self {
        Self {
            db,
            cache,
            invoice_ttl_secs: settings.invoice_ttl_secs,
            balance_ttl_secs: settings.balance_ttl_secs,
        }
    }

    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend_name()
    }

    pub async fn invoice_totals(&self, invoice_id: i64) -> Result<DocumentTotals, ApiErr> {
        let key = invoice_totals_key(invoice_id);
        if let Some(totals) = self.cache.get_json(&key).await {
            return Ok(totals);
        }
        let totals = {
            let conn = self.db.conn();
            compute_invoice_totals(&conn, invoice_id).map_err(ApiErr::from_db("invoice totals"))?
        }
        .ok_or_else(|| ApiErr::not_found("invoice not found"))?;
        self.cache.put_json(&key, &totals, self.invoice_ttl_secs).await;
        Ok(totals)
    }

    pub async fn quote_totals(&self, quote_id: i64) -> Result<DocumentTotals, ApiErr> {
        let key = quote_totals_key(quote_id);
        if let Some(totals) = self.cache.get_json(&key).await {
            return Ok(totals);
        }
        let totals = {
            let conn = self.db.conn();
            compute_quote_totals(&conn, quote_id).map_err(ApiErr::from_db("quote totals"))?
        }
        .ok_or_else(|| ApiErr::not_found("quote not found"))?;
        self.cache.put_json(&key, &totals, self.invoice_ttl_secs).await;
        Ok(totals)
    }

    pub async fn client_balance(
        &self,
        client_id: i64,
        today: NaiveDate,
    ) -> Result<ClientBalance, ApiErr> {
        let key = client_balance_key(client_id);
        if let Some(balance) = self.cache.get_json(&key).await {
            return Ok(balance);
        }
        let balance = {
            let conn = self.db.conn();
            compute_client_balance(&conn, client_id, today)
                .map_err(ApiErr::from_db("client balance"))?
        };
        self.cache.put_json(&key, &balance, self.balance_ttl_secs).await;
        Ok(balance)
    }

    /// Drop cached figures touched by a change to an invoice.
    pub async fn invalidate_invoice(&self, invoice_id: i64, client_id: i64) {
        self.cache
            .invalidate(&[invoice_totals_key(invoice_id), client_balance_key(client_id)])
            .await;
    }

    pub async fn invalidate_quote(&self, quote_id: i64) {
        self.cache.invalidate(&[quote_totals_key(quote_id)]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_execute, sq_insert};
    use ledgerdesk_api::db::billing::{NewInvoice, NewItem, NewPayment};
    use ledgerdesk_api::db::clients;
    use ledgerdesk_api::{CreateClientRequest, InvoiceStatus};
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn day(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    fn seed_client(conn: &Connection) -> i64 {
        sq_insert(
            conn,
            clients::insert(&CreateClientRequest {
                name: "Acme".into(),
                email: None,
                phone: None,
                website: None,
                net_terms: None,
                hourly_rate: None,
                notes: None,
            }),
        )
        .unwrap()
    }

    fn seed_invoice(conn: &Connection, client_id: i64, number: i64, due: NaiveDate, price: &str) -> i64 {
        let id = sq_insert(
            conn,
            billing::insert_invoice(&NewInvoice {
                client_id,
                prefix: "INV-",
                number,
                date: day(2024, 1, 1),
                due_date: due,
                discount: Decimal::ZERO,
                note: None,
            }),
        )
        .unwrap();
        sq_insert(
            conn,
            billing::insert_item(
                ItemOwner::Invoice(id),
                &NewItem {
                    product_id: None,
                    name: "Support".into(),
                    description: None,
                    quantity: Decimal::ONE,
                    price: d(price),
                    discount: Decimal::ZERO,
                    tax_id: None,
                },
            ),
        )
        .unwrap();
        sq_execute(conn, billing::set_invoice_status(id, InvoiceStatus::Sent)).unwrap();
        id
    }

    #[test]
    fn invoice_totals_subtract_payments() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        let client = seed_client(&conn);
        let id = seed_invoice(&conn, client, 1, day(2024, 1, 31), "100.00");
        sq_insert(
            &conn,
            billing::insert_payment(&NewPayment {
                invoice_id: id,
                account_id: None,
                date: day(2024, 1, 10),
                amount: d("40"),
                method: None,
                reference: None,
            }),
        )
        .unwrap();

        let totals = compute_invoice_totals(&conn, id).unwrap().unwrap();
        assert_eq!(totals.total, d("100.00"));
        assert_eq!(totals.paid, d("40.00"));
        assert_eq!(totals.balance, d("60.00"));
        assert!(compute_invoice_totals(&conn, 999).unwrap().is_none());
    }

    #[test]
    fn drafts_are_not_receivable() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        let client = seed_client(&conn);
        seed_invoice(&conn, client, 1, day(2024, 1, 31), "100.00");
        let draft = seed_invoice(&conn, client, 2, day(2024, 1, 31), "50.00");
        sq_execute(&conn, billing::set_invoice_status(draft, InvoiceStatus::Draft)).unwrap();
        seed_invoice(&conn, client, 3, day(2024, 4, 30), "25.00");

        let balance = compute_client_balance(&conn, client, day(2024, 3, 1)).unwrap();
        assert_eq!(balance.balance, d("125.00"));
        assert_eq!(balance.aging.days_1_30, d("100.00"));
        assert_eq!(balance.aging.current, d("25.00"));
        assert_eq!(balance.aging.invoice_count, 2);

        let all = compute_aging(&conn, None, day(2024, 3, 1)).unwrap();
        assert_eq!(all, balance.aging);
    }

    #[tokio::test]
    async fn cached_totals_refresh_after_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let accounting = Accounting::new(db.clone(), TotalsCache::memory(), &CacheSettings::default());
        let (client, id) = {
            let conn = db.conn();
            let client = seed_client(&conn);
            (client, seed_invoice(&conn, client, 1, day(2024, 1, 31), "80.00"))
        };

        assert_eq!(accounting.invoice_totals(id).await.unwrap().total, d("80.00"));
        {
            let conn = db.conn();
            sq_execute(&conn, billing::update_item(1, &NewItem {
                product_id: None,
                name: "Support".into(),
                description: None,
                quantity: d("2"),
                price: d("80.00"),
                discount: Decimal::ZERO,
                tax_id: None,
            }))
            .unwrap();
        }
        assert_eq!(accounting.invoice_totals(id).await.unwrap().total, d("80.00"));

        accounting.invalidate_invoice(id, client).await;
        assert_eq!(accounting.invoice_totals(id).await.unwrap().total, d("160.00"));
        assert!(accounting.invoice_totals(999).await.is_err());
    }
}
