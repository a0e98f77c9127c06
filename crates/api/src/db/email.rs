//! Outbound email queue. Delivery happens elsewhere; the server only records
//! messages and their delivery outcome.

use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::EmailQueue;
use super::{Built, now};
use crate::EmailStatus;

/// Columns: id, sender, recipient, subject, body, status, attempts,
/// last_error, created_at, sent_at. Must match `email_from_row()`.
fn email_select() -> SelectStatement {
    Query::select()
        .columns([
            EmailQueue::Id,
            EmailQueue::Sender,
            EmailQueue::Recipient,
            EmailQueue::Subject,
            EmailQueue::Body,
            EmailQueue::Status,
            EmailQueue::Attempts,
            EmailQueue::LastError,
            EmailQueue::CreatedAt,
            EmailQueue::SentAt,
        ])
        .from(EmailQueue::Table)
        .to_owned()
}

pub fn get(id: i64) -> Built {
    email_select()
        .and_where(Expr::col(EmailQueue::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Oldest first, so a sender can drain the queue in order.
pub fn list(status: Option<EmailStatus>) -> Built {
    let mut select = email_select();
    if let Some(status) = status {
        select.and_where(Expr::col(EmailQueue::Status).eq(status.as_str()));
    }
    select
        .order_by(EmailQueue::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub struct NewEmail<'a> {
    pub sender: &'a str,
    pub recipient: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

pub fn insert(email: &NewEmail<'_>) -> Built {
    Query::insert()
        .into_table(EmailQueue::Table)
        .columns([
            EmailQueue::Sender,
            EmailQueue::Recipient,
            EmailQueue::Subject,
            EmailQueue::Body,
        ])
        .values_panic([
            email.sender.into(),
            email.recipient.into(),
            email.subject.into(),
            email.body.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn mark_sent(id: i64) -> Built {
    Query::update()
        .table(EmailQueue::Table)
        .value(EmailQueue::Status, EmailStatus::Sent.as_str())
        .value(EmailQueue::Attempts, Expr::col(EmailQueue::Attempts).add(1))
        .value(EmailQueue::LastError, Option::<String>::None)
        .value(EmailQueue::SentAt, now())
        .and_where(Expr::col(EmailQueue::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn mark_failed(id: i64, error: &str) -> Built {
    Query::update()
        .table(EmailQueue::Table)
        .value(EmailQueue::Status, EmailStatus::Failed.as_str())
        .value(EmailQueue::Attempts, Expr::col(EmailQueue::Attempts).add(1))
        .value(EmailQueue::LastError, error)
        .and_where(Expr::col(EmailQueue::Id).eq(id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_counts_an_attempt() {
        let (sql, values) = mark_failed(5, "mailbox full");
        assert!(sql.contains(r#""attempts" = "attempts" + ?"#));
        assert_eq!(values.0[2], sea_query::Value::from("mailbox full"));
    }

    #[test]
    fn insert_records_sender() {
        let (sql, values) = insert(&NewEmail {
            sender: "Billing <billing@example.com>",
            recipient: "ap@client.example",
            subject: "Invoice INV-1",
            body: "hello",
        });
        assert!(sql.starts_with(r#"INSERT INTO "email_queue" ("sender", "recipient""#));
        assert_eq!(values.0[0], sea_query::Value::from("Billing <billing@example.com>"));
    }

    #[test]
    fn list_by_status() {
        let (sql, values) = list(Some(EmailStatus::Queued));
        assert!(sql.contains(r#"WHERE "status" = ?"#));
        assert_eq!(values.0[0], sea_query::Value::from("queued"));
    }
}
