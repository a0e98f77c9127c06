//! Invoice and quote totals.
//!
//! A document total is `Σ subtotal × (1 + tax%) − Σ item discounts − document
//! discount`, rounded once to cents. The balance is the total minus payments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{percent_of, round_money};

/// One line of an invoice or quote.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub quantity: Decimal,
    pub price: Decimal,
    /// Flat discount on this line.
    pub discount: Decimal,
    /// `None` when the line is not taxed.
    pub tax_percent: Option<Decimal>,
}

impl LineItem {
    pub fn subtotal(&self) -> Decimal {
        self.quantity * self.price
    }

    pub fn tax(&self) -> Decimal {
        self.tax_percent
            .map(|pct| percent_of(self.subtotal(), pct))
            .unwrap_or(Decimal::ZERO)
    }

    /// Line total, rounded to cents.
    pub fn total(&self) -> Decimal {
        round_money(self.subtotal() + self.tax() - self.discount)
    }
}

/// Computed totals of a billing document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub paid: Decimal,
    pub balance: Decimal,
}

/// Compute totals for a set of lines, a document-level discount and the
/// amount already paid.
pub fn document_totals(items: &[LineItem], document_discount: Decimal, paid: Decimal) -> DocumentTotals {
    let mut subtotal = Decimal::ZERO;
    let mut tax = Decimal::ZERO;
    let mut discount = document_discount;
    for item in items {
        subtotal += item.subtotal();
        tax += item.tax();
        discount += item.discount;
    }

    let total = round_money(subtotal + tax - discount);
    let paid = round_money(paid);
    DocumentTotals {
        subtotal: round_money(subtotal),
        tax: round_money(tax),
        discount: round_money(discount),
        total,
        paid,
        balance: round_money(total - paid),
    }
}

/// Payment standing of a document, derived from its total and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStanding {
    Unpaid,
    Partial,
    Paid,
}

/// How a payment was (or will be) made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Ach,
    Check,
    Cash,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Ach => "ach",
            Self::Check => "check",
            Self::Cash => "cash",
            Self::Other => "other",
        }
    }

    /// Lenient parse used by imports and form input.
    pub fn parse(text: &str) -> Option<Self> {
        let key = text.trim().to_ascii_lowercase();
        let method = match key.as_str() {
            "card" | "credit card" | "credit" | "debit card" | "cc" | "visa" | "mastercard" | "amex" => Self::Card,
            "ach" | "bank" | "bank transfer" | "echeck" | "e-check" | "eft" => Self::Ach,
            "check" | "cheque" => Self::Check,
            "cash" => Self::Cash,
            "other" => Self::Other,
            _ => return None,
        };
        Some(method)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn payment_status(total: Decimal, paid: Decimal) -> PaymentStanding {
    if total > Decimal::ZERO && paid >= total {
        PaymentStanding::Paid
    } else if paid > Decimal::ZERO && paid < total {
        PaymentStanding::Partial
    } else {
        PaymentStanding::Unpaid
    }
}
