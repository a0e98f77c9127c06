//! Shared business rules: framework-agnostic pure functions.
//!
//! Route handlers stay thin adapters; anything that decides a value or
//! rejects input lives here so it can be tested without a database.

use chrono::{Days, NaiveDate};
use ledgerdesk_core::billing::{PaymentStanding, payment_status};
use ledgerdesk_core::money::round_money;
use rust_decimal::Decimal;

use crate::{DocumentTotals, InvoiceStatus, ServiceError, TicketStatus};

// ─── Validation ─────────────────────────────────────────────────────────────

/// Trim a required text field and enforce a length limit.
pub fn validate_name(field: &str, value: &str, max_len: usize) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max_len {
        return Err(ServiceError::BadRequest(format!(
            "{field} must be 1-{max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate and normalize an email address. Returns the lowercased, trimmed email.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || email.len() > 254 {
        return Err(ServiceError::BadRequest("invalid email address".into()));
    }
    Ok(email)
}

/// Blank optional text becomes `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`validate_email`] for optional fields; blank is `None`.
pub fn optional_email(value: Option<String>) -> Result<Option<String>, ServiceError> {
    optional_text(value).map(|v| validate_email(&v)).transpose()
}

pub fn validate_percent(percent: Decimal) -> Result<Decimal, ServiceError> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(ServiceError::BadRequest(
            "percent must be between 0 and 100".into(),
        ));
    }
    Ok(percent)
}

pub fn validate_non_negative(field: &str, value: Decimal) -> Result<Decimal, ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::BadRequest(format!("{field} must not be negative")));
    }
    Ok(value)
}

pub fn validate_positive(field: &str, value: Decimal) -> Result<Decimal, ServiceError> {
    if value <= Decimal::ZERO {
        return Err(ServiceError::BadRequest(format!("{field} must be greater than zero")));
    }
    Ok(value)
}

// ─── Numbering ──────────────────────────────────────────────────────────────

/// Display form of a document number: prefix followed by the sequence.
pub fn document_number(prefix: &str, number: i64) -> String {
    format!("{prefix}{number}")
}

/// Next sequence value after the current maximum (`None` when empty).
pub fn next_number(current_max: Option<i64>) -> i64 {
    current_max.unwrap_or(0) + 1
}

// ─── API Key Generation ─────────────────────────────────────────────────────

/// Generate a new API key with the `ldk_` prefix.
pub fn generate_api_key() -> String {
    format!("ldk_{}", uuid::Uuid::new_v4().simple())
}

/// Hash an API key for persistent storage and lookup.
pub fn hash_api_key(api_key: &str) -> String {
    crate::crypto::hash_token(api_key)
}

// ─── Pagination ─────────────────────────────────────────────────────────────

pub const DEFAULT_PER_PAGE: u32 = 50;
pub const MAX_PER_PAGE: u32 = 200;

/// Resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub per_page: u32,
}

impl PageWindow {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

// ─── Billing rules ──────────────────────────────────────────────────────────

/// Due date from net terms; same-day when terms are zero.
pub fn due_date(date: NaiveDate, net_terms: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(net_terms)))
        .unwrap_or(date)
}

/// Invoice status after its payments changed.
///
/// Fully paid becomes `paid`, partly paid `partial`; an invoice that loses
/// all its payments drops back to `sent`. Unpaid drafts and cancelled
/// invoices keep their status.
pub fn status_after_payments(current: InvoiceStatus, totals: &DocumentTotals) -> InvoiceStatus {
    match payment_status(totals.total, totals.paid) {
        PaymentStanding::Paid => InvoiceStatus::Paid,
        PaymentStanding::Partial => InvoiceStatus::Partial,
        PaymentStanding::Unpaid => match current {
            InvoiceStatus::Paid | InvoiceStatus::Partial => InvoiceStatus::Sent,
            other => other,
        },
    }
}

/// Reject payments on cancelled invoices and payments above the balance.
pub fn check_payment(
    status: InvoiceStatus,
    amount: Decimal,
    totals: &DocumentTotals,
) -> Result<Decimal, ServiceError> {
    let amount = round_money(validate_positive("amount", amount)?);
    if status == InvoiceStatus::Cancelled {
        return Err(ServiceError::Conflict(
            "cannot record a payment on a cancelled invoice".into(),
        ));
    }
    if amount > totals.balance {
        return Err(ServiceError::BadRequest(format!(
            "payment of {amount} exceeds the balance of {}",
            totals.balance
        )));
    }
    Ok(amount)
}

pub fn monthly_amount(quantity: Decimal, price: Decimal) -> Decimal {
    round_money(quantity * price)
}

// ─── Tickets & projects ─────────────────────────────────────────────────────

/// What a status change does to `closed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedAtChange {
    Set,
    Clear,
    Keep,
}

pub fn closed_at_change(from: TicketStatus, to: TicketStatus) -> ClosedAtChange {
    match (from == TicketStatus::Closed, to == TicketStatus::Closed) {
        (false, true) => ClosedAtChange::Set,
        (true, false) => ClosedAtChange::Clear,
        _ => ClosedAtChange::Keep,
    }
}

/// Whole percent of closed tickets; 0 for an empty project.
pub fn progress_percent(closed: i64, total: i64) -> u32 {
    if total <= 0 {
        return 0;
    }
    u32::try_from(closed.clamp(0, total) * 100 / total).unwrap_or(100)
}

// ─── Payroll ────────────────────────────────────────────────────────────────

/// Regular hours at the rate plus overtime at time and a half.
pub fn gross_pay(rate: Decimal, regular_hours: Decimal, overtime_hours: Decimal) -> Decimal {
    round_money(rate * regular_hours + rate * Decimal::new(15, 1) * overtime_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn totals(total: &str, paid: &str) -> DocumentTotals {
        let total = d(total);
        let paid = d(paid);
        DocumentTotals {
            total,
            paid,
            balance: total - paid,
            ..Default::default()
        }
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("name", "  Acme ", 10).unwrap(), "Acme");
        assert!(validate_name("name", "   ", 10).is_err());
        assert!(validate_name("name", "abcdefghijk", 10).is_err());
    }

    #[test]
    fn emails() {
        assert_eq!(validate_email(" Ops@Acme.COM ").unwrap(), "ops@acme.com");
        assert!(validate_email("nope").is_err());
        assert_eq!(optional_email(Some("  ".into())).unwrap(), None);
        assert!(optional_email(Some("x".into())).is_err());
    }

    #[test]
    fn percent_bounds() {
        assert!(validate_percent(d("0")).is_ok());
        assert!(validate_percent(d("100")).is_ok());
        assert!(validate_percent(d("100.01")).is_err());
        assert!(validate_percent(d("-1")).is_err());
    }

    #[test]
    fn numbering() {
        assert_eq!(next_number(None), 1);
        assert_eq!(next_number(Some(41)), 42);
        assert_eq!(document_number("INV-", 42), "INV-42");
    }

    #[test]
    fn api_keys_are_prefixed_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("ldk_"));
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
        assert_ne!(hash_api_key(&a), hash_api_key(&b));
    }

    #[test]
    fn page_window_clamps() {
        let w = PageWindow::new(None, None);
        assert_eq!((w.page, w.per_page, w.offset()), (1, 50, 0));
        let w = PageWindow::new(Some(0), Some(1000));
        assert_eq!((w.page, w.per_page), (1, 200));
        let w = PageWindow::new(Some(3), Some(20));
        assert_eq!(w.offset(), 40);
    }

    #[test]
    fn due_date_adds_terms() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(due_date(date, 30), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(due_date(date, 0), date);
    }

    #[test]
    fn status_follows_payments() {
        assert_eq!(
            status_after_payments(InvoiceStatus::Sent, &totals("100", "100")),
            InvoiceStatus::Paid
        );
        assert_eq!(
            status_after_payments(InvoiceStatus::Sent, &totals("100", "40")),
            InvoiceStatus::Partial
        );
        assert_eq!(
            status_after_payments(InvoiceStatus::Paid, &totals("100", "0")),
            InvoiceStatus::Sent
        );
        assert_eq!(
            status_after_payments(InvoiceStatus::Draft, &totals("100", "0")),
            InvoiceStatus::Draft
        );
    }

    #[test]
    fn payments_cannot_exceed_balance() {
        let t = totals("100", "60");
        assert_eq!(check_payment(InvoiceStatus::Partial, d("40"), &t).unwrap(), d("40"));
        assert!(matches!(
            check_payment(InvoiceStatus::Partial, d("40.01"), &t),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(check_payment(InvoiceStatus::Sent, d("0"), &t).is_err());
        assert!(matches!(
            check_payment(InvoiceStatus::Cancelled, d("1"), &t),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn closing_and_reopening() {
        use TicketStatus::*;
        assert_eq!(closed_at_change(Open, Closed), ClosedAtChange::Set);
        assert_eq!(closed_at_change(Closed, Open), ClosedAtChange::Clear);
        assert_eq!(closed_at_change(Closed, Closed), ClosedAtChange::Keep);
        assert_eq!(closed_at_change(New, Resolved), ClosedAtChange::Keep);
    }

    #[test]
    fn progress() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn overtime_at_time_and_a_half() {
        assert_eq!(gross_pay(d("20"), d("40"), d("2")), d("860.00"));
        assert_eq!(monthly_amount(d("3"), d("19.995")), d("59.99"));
    }
}
