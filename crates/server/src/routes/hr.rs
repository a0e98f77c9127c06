use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;

use ledgerdesk_api::db::{self, hr};
use ledgerdesk_api::service;
use ledgerdesk_api::{
    AddBreakRequest, ArchivedQuery, BreakResponse, ClockRequest, CreateEmployeeRequest,
    DirectoryEmployee, EmployeeResponse, EmployeeSyncRequest, EmployeeSyncResponse,
    ListEmployeesResponse, ListTimeEntriesResponse, PayrollLine, PayrollQuery,
    PayrollSummaryResponse, TimeEntryListQuery, TimeEntryResponse, TimesheetQuery,
    TimesheetResponse, UpdateEmployeeRequest,
};
use ledgerdesk_core::payroll::{
    BreakInterval, PayPeriod, PayPeriodRule, ShiftRecord, Timesheet, hours, worked_duration,
};
use ledgerdesk_runtime_config::LedgerConfig;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::routes::clients::optional_rate;
use crate::routes::{found, today};
use crate::storage::{
    Db, EntryRow, break_from_row, employee_from_row, sq_execute, sq_find, sq_insert,
    sq_query_map, time_entry_from_row,
};

fn require_employee(conn: &Connection, id: i64) -> Result<EmployeeResponse, ApiErr> {
    let employee = sq_find(conn, hr::get_employee(id), employee_from_row)
        .map_err(ApiErr::from_db("get employee"))?;
    found(employee, "employee")
}

fn pay_rule(config: &LedgerConfig) -> Result<PayPeriodRule, ApiErr> {
    Ok(PayPeriodRule::new(
        config.payroll.period_weeks,
        config.payroll.anchor_end,
    )?)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Clock-in bounds `[from, until)` covering whole days `from..=to`.
fn day_bounds(from: NaiveDate, to: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (midnight(from), midnight(to) + TimeDelta::days(1))
}

// ---------------------------------------------------------------------------
// Time entry loading
// ---------------------------------------------------------------------------

struct LoadedEntry {
    entry: EntryRow,
    breaks: Vec<BreakResponse>,
}

impl LoadedEntry {
    fn shift(&self) -> ShiftRecord {
        ShiftRecord {
            clock_in: self.entry.clock_in,
            clock_out: self.entry.clock_out,
            breaks: self
                .breaks
                .iter()
                .map(|b| BreakInterval {
                    start: b.start,
                    end: b.end,
                })
                .collect(),
        }
    }

    fn into_response(self) -> TimeEntryResponse {
        let worked_hours = self.entry.clock_out.map(|out| {
            let shift = self.shift();
            hours(worked_duration(shift.clock_in, out, &shift.breaks))
        });
        TimeEntryResponse {
            id: self.entry.id,
            employee_id: self.entry.employee_id,
            clock_in: self.entry.clock_in,
            clock_out: self.entry.clock_out,
            note: self.entry.note,
            breaks: self.breaks,
            worked_hours,
        }
    }
}

fn load_entries(
    conn: &Connection,
    employee_id: Option<i64>,
    from: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
) -> Result<Vec<LoadedEntry>, ApiErr> {
    let entries = sq_query_map(conn, hr::list_entries(employee_id, from, until), time_entry_from_row)
        .map_err(ApiErr::from_db("list time entries"))?;
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
    let mut breaks: HashMap<i64, Vec<BreakResponse>> = HashMap::new();
    for (entry_id, id, start, end) in sq_query_map(conn, hr::breaks_for_entries(&ids), break_from_row)
        .map_err(ApiErr::from_db("list breaks"))?
    {
        breaks.entry(entry_id).or_default().push(BreakResponse { id, start, end });
    }
    Ok(entries
        .into_iter()
        .map(|entry| LoadedEntry {
            breaks: breaks.remove(&entry.id).unwrap_or_default(),
            entry,
        })
        .collect())
}

fn load_entry(conn: &Connection, id: i64) -> Result<LoadedEntry, ApiErr> {
    let entry = sq_find(conn, hr::get_entry(id), time_entry_from_row)
        .map_err(ApiErr::from_db("get time entry"))?;
    let entry = found(entry, "time entry")?;
    let breaks = sq_query_map(conn, hr::breaks_for_entries(&[id]), break_from_row)
        .map_err(ApiErr::from_db("list breaks"))?
        .into_iter()
        .map(|(_, id, start, end)| BreakResponse { id, start, end })
        .collect();
    Ok(LoadedEntry { entry, breaks })
}

// ---------------------------------------------------------------------------
// Employees
// ---------------------------------------------------------------------------

/// POST /api/employees
pub async fn create_employee(
    State(db): State<Db>,
    _auth: AuthUser,
    Json(req): Json<CreateEmployeeRequest>,
) -> Result<(StatusCode, Json<EmployeeResponse>), ApiErr> {
    let req = CreateEmployeeRequest {
        first_name: service::validate_name("first_name", &req.first_name, 100)?,
        last_name: service::validate_name("last_name", &req.last_name, 100)?,
        email: service::optional_email(req.email)?,
        title: service::optional_text(req.title),
        hourly_rate: optional_rate(req.hourly_rate)?,
        external_id: service::optional_text(req.external_id),
    };
    let conn = db.conn();
    let id = sq_insert(&conn, hr::insert_employee(&req))
        .map_err(ApiErr::from_write("insert employee", "external_id already in use"))?;
    tracing::info!(employee_id = id, "employee created");
    Ok((StatusCode::CREATED, Json(require_employee(&conn, id)?)))
}

/// GET /api/employees
pub async fn list_employees(
    State(db): State<Db>,
    _auth: AuthUser,
    Query(q): Query<ArchivedQuery>,
) -> Result<Json<ListEmployeesResponse>, ApiErr> {
    let conn = db.conn();
    let employees = sq_query_map(&conn, hr::list_employees(q.archived), employee_from_row)
        .map_err(ApiErr::from_db("list employees"))?;
    Ok(Json(ListEmployeesResponse { employees }))
}

/// GET /api/employees/{id}
pub async fn get_employee(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<EmployeeResponse>, ApiErr> {
    let conn = db.conn();
    Ok(Json(require_employee(&conn, id)?))
}

/// PUT /api/employees/{id}
pub async fn update_employee(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEmployeeRequest>,
) -> Result<Json<EmployeeResponse>, ApiErr> {
    let req = UpdateEmployeeRequest {
        first_name: req
            .first_name
            .map(|n| service::validate_name("first_name", &n, 100))
            .transpose()?,
        last_name: req
            .last_name
            .map(|n| service::validate_name("last_name", &n, 100))
            .transpose()?,
        email: service::optional_email(req.email)?,
        title: req.title.map(|t| t.trim().to_string()),
        hourly_rate: optional_rate(req.hourly_rate)?,
    };
    let conn = db.conn();
    require_employee(&conn, id)?;
    sq_execute(&conn, hr::update_employee(id, &req)).map_err(ApiErr::from_db("update employee"))?;
    Ok(Json(require_employee(&conn, id)?))
}

/// POST /api/employees/{id}/archive
pub async fn archive_employee(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<EmployeeResponse>, ApiErr> {
    let conn = db.conn();
    require_employee(&conn, id)?;
    sq_execute(
        &conn,
        db::set_archived(db::Employees::Table, db::Employees::Id, db::Employees::ArchivedAt, id, true),
    )
    .map_err(ApiErr::from_db("archive employee"))?;
    Ok(Json(require_employee(&conn, id)?))
}

fn normalize_directory(rec: &DirectoryEmployee) -> Result<DirectoryEmployee, ApiErr> {
    let external_id = rec.external_id.trim();
    if external_id.is_empty() {
        return Err(ApiErr::bad_request("external_id is required"));
    }
    Ok(DirectoryEmployee {
        external_id: external_id.to_string(),
        first_name: service::validate_name("first_name", &rec.first_name, 100)?,
        last_name: service::validate_name("last_name", &rec.last_name, 100)?,
        email: service::optional_email(rec.email.clone())?,
        title: service::optional_text(rec.title.clone()),
    })
}

fn matches_directory(current: &EmployeeResponse, rec: &DirectoryEmployee) -> bool {
    current.first_name == rec.first_name
        && current.last_name == rec.last_name
        && current.email == rec.email
        && current.title == rec.title
}

fn sync_directory(
    conn: &mut Connection,
    records: &[DirectoryEmployee],
) -> Result<EmployeeSyncResponse, ApiErr> {
    let records = records
        .iter()
        .map(normalize_directory)
        .collect::<Result<Vec<_>, _>>()?;
    let mut seen = HashSet::new();
    for rec in &records {
        if !seen.insert(rec.external_id.as_str()) {
            return Err(ApiErr::bad_request(format!(
                "duplicate external_id '{}'",
                rec.external_id
            )));
        }
    }

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let mut outcome = EmployeeSyncResponse::default();
    for rec in &records {
        let existing = sq_find(&tx, hr::get_by_external_id(&rec.external_id), employee_from_row)
            .map_err(ApiErr::from_db("find employee"))?;
        match existing {
            None => {
                sq_insert(&tx, hr::insert_from_directory(rec))
                    .map_err(ApiErr::from_db("insert employee"))?;
                outcome.inserted += 1;
            }
            Some(current) if matches_directory(&current, rec) => outcome.unchanged += 1,
            Some(current) => {
                sq_execute(&tx, hr::update_from_directory(current.id, rec))
                    .map_err(ApiErr::from_db("update employee"))?;
                outcome.updated += 1;
            }
        }
    }
    tx.commit().map_err(ApiErr::from_db("commit"))?;
    Ok(outcome)
}

/// POST /api/employees/sync - upsert staff-directory records by external id.
/// Runs in one transaction; any invalid record rejects the whole batch.
pub async fn sync_employees(
    State(db): State<Db>,
    auth: AuthUser,
    Json(req): Json<EmployeeSyncRequest>,
) -> Result<Json<EmployeeSyncResponse>, ApiErr> {
    auth.require_admin()?;
    let outcome = {
        let mut conn = db.conn();
        sync_directory(&mut conn, &req.employees)?
    };
    tracing::info!(
        inserted = outcome.inserted,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        "staff directory synced"
    );
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Time entries
// ---------------------------------------------------------------------------

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// POST /api/employees/{id}/clock-in
pub async fn clock_in(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ClockRequest>,
) -> Result<(StatusCode, Json<TimeEntryResponse>), ApiErr> {
    let at = req.at.unwrap_or_else(now);
    let note = service::optional_text(req.note);
    let mut conn = db.conn();
    let employee = require_employee(&conn, id)?;
    if employee.archived_at.is_some() {
        return Err(ApiErr::conflict("employee is archived"));
    }

    let tx = conn.transaction().map_err(ApiErr::from_db("begin"))?;
    let open = sq_find(&tx, hr::open_entry(id), time_entry_from_row)
        .map_err(ApiErr::from_db("open entry"))?;
    if open.is_some() {
        return Err(ApiErr::conflict("employee is already clocked in"));
    }
    let entry_id = sq_insert(&tx, hr::insert_entry(id, at, note.as_deref()))
        .map_err(ApiErr::from_db("clock in"))?;
    let entry = load_entry(&tx, entry_id)?;
    tx.commit().map_err(ApiErr::from_db("commit"))?;

    tracing::info!(employee_id = id, entry_id, "clocked in");
    Ok((StatusCode::CREATED, Json(entry.into_response())))
}

/// POST /api/employees/{id}/clock-out
pub async fn clock_out(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ClockRequest>,
) -> Result<Json<TimeEntryResponse>, ApiErr> {
    let at = req.at.unwrap_or_else(now);
    let conn = db.conn();
    require_employee(&conn, id)?;
    let open = sq_find(&conn, hr::open_entry(id), time_entry_from_row)
        .map_err(ApiErr::from_db("open entry"))?
        .ok_or_else(|| ApiErr::conflict("employee is not clocked in"))?;
    if at < open.clock_in {
        return Err(ApiErr::bad_request("clock-out is before clock-in"));
    }
    let closed = sq_execute(&conn, hr::clock_out(open.id, at))
        .map_err(ApiErr::from_db("clock out"))?;
    if closed == 0 {
        return Err(ApiErr::conflict("entry was already closed"));
    }
    tracing::info!(employee_id = id, entry_id = open.id, "clocked out");
    Ok(Json(load_entry(&conn, open.id)?.into_response()))
}

/// POST /api/time-entries/{id}/breaks
pub async fn add_break(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AddBreakRequest>,
) -> Result<(StatusCode, Json<TimeEntryResponse>), ApiErr> {
    if req.end <= req.start {
        return Err(ApiErr::bad_request("break must end after it starts"));
    }
    let conn = db.conn();
    let current = load_entry(&conn, id)?;
    if req.start < current.entry.clock_in
        || current.entry.clock_out.is_some_and(|out| req.end > out)
    {
        return Err(ApiErr::bad_request("break must fall within the shift"));
    }
    sq_insert(&conn, hr::insert_break(id, req.start, req.end))
        .map_err(ApiErr::from_db("insert break"))?;
    Ok((StatusCode::CREATED, Json(load_entry(&conn, id)?.into_response())))
}

/// GET /api/employees/{id}/time-entries?from=&to=
pub async fn list_time_entries(
    State(db): State<Db>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Query(q): Query<TimeEntryListQuery>,
) -> Result<Json<ListTimeEntriesResponse>, ApiErr> {
    if let (Some(from), Some(to)) = (q.from, q.to) {
        if to < from {
            return Err(ApiErr::bad_request("'to' must not be before 'from'"));
        }
    }
    let conn = db.conn();
    require_employee(&conn, id)?;
    let from = q.from.map(midnight);
    let until = q.to.map(|to| midnight(to) + TimeDelta::days(1));
    let entries = load_entries(&conn, Some(id), from, until)?
        .into_iter()
        .map(LoadedEntry::into_response)
        .collect();
    Ok(Json(ListTimeEntriesResponse { entries }))
}

fn timesheet_for(
    conn: &Connection,
    employee_id: Option<i64>,
    period: PayPeriod,
    threshold: u32,
) -> Result<HashMap<i64, Timesheet>, ApiErr> {
    let (from, until) = day_bounds(period.start, period.end);
    let mut shifts: HashMap<i64, Vec<ShiftRecord>> = HashMap::new();
    for loaded in load_entries(conn, employee_id, Some(from), Some(until))? {
        shifts
            .entry(loaded.entry.employee_id)
            .or_default()
            .push(loaded.shift());
    }
    Ok(shifts
        .into_iter()
        .map(|(id, shifts)| (id, Timesheet::build(period, &shifts, threshold)))
        .collect())
}

/// GET /api/employees/{id}/timesheet?date= - the pay period containing the
/// date (default today).
pub async fn timesheet(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Query(q): Query<TimesheetQuery>,
) -> Result<Json<TimesheetResponse>, ApiErr> {
    let period = pay_rule(&config)?.period_containing(q.date.unwrap_or_else(today));
    let threshold = config.payroll.overtime_threshold_hours;
    let conn = db.conn();
    require_employee(&conn, id)?;
    let timesheet = timesheet_for(&conn, Some(id), period, threshold)?
        .remove(&id)
        .unwrap_or_else(|| Timesheet::build(period, &[], threshold));
    Ok(Json(TimesheetResponse {
        employee_id: id,
        timesheet,
    }))
}

/// GET /api/payroll/summary?today= - hours and gross pay per active employee
/// for the last completed pay period.
pub async fn payroll_summary(
    State(db): State<Db>,
    State(config): State<Arc<LedgerConfig>>,
    _auth: AuthUser,
    Query(q): Query<PayrollQuery>,
) -> Result<Json<PayrollSummaryResponse>, ApiErr> {
    let period = pay_rule(&config)?.last_completed(q.today.unwrap_or_else(today));
    let threshold = config.payroll.overtime_threshold_hours;
    let conn = db.conn();
    let employees = sq_query_map(&conn, hr::list_employees(false), employee_from_row)
        .map_err(ApiErr::from_db("list employees"))?;
    let mut sheets = timesheet_for(&conn, None, period, threshold)?;

    let lines: Vec<PayrollLine> = employees
        .into_iter()
        .map(|employee| {
            let sheet = sheets
                .remove(&employee.id)
                .unwrap_or_else(|| Timesheet::build(period, &[], threshold));
            PayrollLine {
                employee_id: employee.id,
                name: format!("{} {}", employee.first_name, employee.last_name),
                regular_hours: sheet.regular_hours,
                overtime_hours: sheet.overtime_hours,
                total_hours: sheet.total_hours,
                open_entries: sheet.open_entries,
                hourly_rate: employee.hourly_rate,
                gross_pay: employee
                    .hourly_rate
                    .map(|rate| service::gross_pay(rate, sheet.regular_hours, sheet.overtime_hours)),
            }
        })
        .collect();
    let total_hours: Decimal = lines.iter().map(|l| l.total_hours).sum();

    Ok(Json(PayrollSummaryResponse {
        period,
        employees: lines,
        total_hours,
    }))
}
