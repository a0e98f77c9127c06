//! Employee, time entry and break query builders.

use chrono::NaiveDateTime;
use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::{Employees, TimeEntries, TimeEntryBreaks};
use super::{Built, Changes, archived_filter, now, opt_money, opt_text, timestamp};
use crate::{CreateEmployeeRequest, DirectoryEmployee, UpdateEmployeeRequest};

// ── Employees ──────────────────────────────────────────────────────────────

/// Columns: id, external_id, first_name, last_name, email, title,
/// hourly_rate, created_at, archived_at. Must match `employee_from_row()`.
fn employee_select() -> SelectStatement {
    Query::select()
        .columns([
            Employees::Id,
            Employees::ExternalId,
            Employees::FirstName,
            Employees::LastName,
            Employees::Email,
            Employees::Title,
            Employees::HourlyRate,
            Employees::CreatedAt,
            Employees::ArchivedAt,
        ])
        .from(Employees::Table)
        .to_owned()
}

pub fn get_employee(id: i64) -> Built {
    employee_select()
        .and_where(Expr::col(Employees::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn get_by_external_id(external_id: &str) -> Built {
    employee_select()
        .and_where(Expr::col(Employees::ExternalId).eq(external_id))
        .build(SqliteQueryBuilder)
}

pub fn list_employees(archived: bool) -> Built {
    employee_select()
        .and_where(archived_filter(Employees::ArchivedAt, archived))
        .order_by(Employees::LastName, Order::Asc)
        .order_by(Employees::FirstName, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_employee(req: &CreateEmployeeRequest) -> Built {
    Query::insert()
        .into_table(Employees::Table)
        .columns([
            Employees::ExternalId,
            Employees::FirstName,
            Employees::LastName,
            Employees::Email,
            Employees::Title,
            Employees::HourlyRate,
        ])
        .values_panic([
            opt_text(req.external_id.as_deref()).into(),
            req.first_name.as_str().into(),
            req.last_name.as_str().into(),
            opt_text(req.email.as_deref()).into(),
            opt_text(req.title.as_deref()).into(),
            opt_money(req.hourly_rate).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_employee(id: i64, req: &UpdateEmployeeRequest) -> Built {
    let mut changes = Changes::new(Employees::Table);
    changes
        .set(Employees::UpdatedAt, now())
        .set_opt(Employees::FirstName, req.first_name.as_deref())
        .set_opt(Employees::LastName, req.last_name.as_deref())
        .set_opt(Employees::Email, req.email.as_deref())
        .set_opt(Employees::Title, req.title.as_deref())
        .set_opt(Employees::HourlyRate, req.hourly_rate.map(super::money));
    changes.build_always(Expr::col(Employees::Id).eq(id))
}

/// Overwrite directory-owned fields. Pay rate and archive state are local.
pub fn update_from_directory(id: i64, rec: &DirectoryEmployee) -> Built {
    Query::update()
        .table(Employees::Table)
        .value(Employees::FirstName, rec.first_name.as_str())
        .value(Employees::LastName, rec.last_name.as_str())
        .value(Employees::Email, opt_text(rec.email.as_deref()))
        .value(Employees::Title, opt_text(rec.title.as_deref()))
        .value(Employees::UpdatedAt, now())
        .and_where(Expr::col(Employees::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn insert_from_directory(rec: &DirectoryEmployee) -> Built {
    Query::insert()
        .into_table(Employees::Table)
        .columns([
            Employees::ExternalId,
            Employees::FirstName,
            Employees::LastName,
            Employees::Email,
            Employees::Title,
        ])
        .values_panic([
            rec.external_id.as_str().into(),
            rec.first_name.as_str().into(),
            rec.last_name.as_str().into(),
            opt_text(rec.email.as_deref()).into(),
            opt_text(rec.title.as_deref()).into(),
        ])
        .build(SqliteQueryBuilder)
}

// ── Time entries ───────────────────────────────────────────────────────────

/// Columns: id, employee_id, clock_in, clock_out, note. Must match
/// `time_entry_from_row()`.
fn entry_select() -> SelectStatement {
    Query::select()
        .columns([
            TimeEntries::Id,
            TimeEntries::EmployeeId,
            TimeEntries::ClockIn,
            TimeEntries::ClockOut,
            TimeEntries::Note,
        ])
        .from(TimeEntries::Table)
        .to_owned()
}

pub fn get_entry(id: i64) -> Built {
    entry_select()
        .and_where(Expr::col(TimeEntries::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// The entry an employee is currently clocked in on, if any.
pub fn open_entry(employee_id: i64) -> Built {
    entry_select()
        .and_where(Expr::col(TimeEntries::EmployeeId).eq(employee_id))
        .and_where(Expr::col(TimeEntries::ClockOut).is_null())
        .order_by(TimeEntries::ClockIn, Order::Desc)
        .limit(1)
        .build(SqliteQueryBuilder)
}

/// Entries whose clock-in falls in `[from, until)`; either bound optional.
pub fn list_entries(
    employee_id: Option<i64>,
    from: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
) -> Built {
    let mut select = entry_select();
    if let Some(employee_id) = employee_id {
        select.and_where(Expr::col(TimeEntries::EmployeeId).eq(employee_id));
    }
    if let Some(from) = from {
        select.and_where(Expr::col(TimeEntries::ClockIn).gte(timestamp(from)));
    }
    if let Some(until) = until {
        select.and_where(Expr::col(TimeEntries::ClockIn).lt(timestamp(until)));
    }
    select
        .order_by(TimeEntries::ClockIn, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_entry(employee_id: i64, clock_in: NaiveDateTime, note: Option<&str>) -> Built {
    Query::insert()
        .into_table(TimeEntries::Table)
        .columns([TimeEntries::EmployeeId, TimeEntries::ClockIn, TimeEntries::Note])
        .values_panic([
            employee_id.into(),
            timestamp(clock_in).into(),
            opt_text(note).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Close an open entry. Matches nothing if it was already closed.
pub fn clock_out(id: i64, at: NaiveDateTime) -> Built {
    Query::update()
        .table(TimeEntries::Table)
        .value(TimeEntries::ClockOut, timestamp(at))
        .and_where(Expr::col(TimeEntries::Id).eq(id))
        .and_where(Expr::col(TimeEntries::ClockOut).is_null())
        .build(SqliteQueryBuilder)
}

// ── Breaks ─────────────────────────────────────────────────────────────────

/// Columns: id, time_entry_id, start_at, end_at.
pub fn breaks_for_entries(entry_ids: &[i64]) -> Built {
    Query::select()
        .columns([
            TimeEntryBreaks::Id,
            TimeEntryBreaks::TimeEntryId,
            TimeEntryBreaks::StartAt,
            TimeEntryBreaks::EndAt,
        ])
        .from(TimeEntryBreaks::Table)
        .and_where(Expr::col(TimeEntryBreaks::TimeEntryId).is_in(entry_ids.iter().copied()))
        .order_by(TimeEntryBreaks::StartAt, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn insert_break(entry_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> Built {
    Query::insert()
        .into_table(TimeEntryBreaks::Table)
        .columns([
            TimeEntryBreaks::TimeEntryId,
            TimeEntryBreaks::StartAt,
            TimeEntryBreaks::EndAt,
        ])
        .values_panic([entry_id.into(), timestamp(start).into(), timestamp(end).into()])
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn entry_range_is_half_open() {
        let (sql, values) = list_entries(Some(1), Some(at(0)), Some(at(23)));
        assert!(sql.contains(r#""clock_in" >= ? AND "clock_in" < ?"#));
        assert_eq!(values.0[1], sea_query::Value::from("2024-03-04 00:00:00"));
    }

    #[test]
    fn clock_out_only_touches_open_entries() {
        let (sql, _) = clock_out(3, at(17));
        assert!(sql.ends_with(r#"AND "clock_out" IS NULL"#));
    }

    #[test]
    fn breaks_for_many_entries() {
        let (sql, values) = breaks_for_entries(&[1, 2, 3]);
        assert!(sql.contains(r#""time_entry_id" IN (?, ?, ?)"#));
        assert_eq!(values.0.len(), 3);
    }
}
