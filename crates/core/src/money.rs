//! Money helpers. All amounts are `Decimal`; rounding happens once, at the
//! end of a computation, to two places.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::CoreError;

/// Round to cents, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a user-entered amount: `1234.5`, `$1,234.50`, `-3`, `(12.00)`.
pub fn parse_money(text: &str) -> Result<Decimal, CoreError> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Err(CoreError::InvalidAmount(text.to_string()));
    }

    let value: Decimal = cleaned
        .parse()
        .map_err(|_| CoreError::InvalidAmount(text.to_string()))?;
    Ok(if negative { -value } else { value })
}

/// Percent of an amount, unrounded.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_halves_away_from_zero() {
        assert_eq!(round_money(d("2.345")), d("2.35"));
        assert_eq!(round_money(d("-2.345")), d("-2.35"));
        assert_eq!(round_money(d("2.344")), d("2.34"));
        assert_eq!(round_money(d("10")), d("10"));
    }

    #[test]
    fn parses_formatted_amounts() {
        assert_eq!(parse_money("1234.5").unwrap(), d("1234.5"));
        assert_eq!(parse_money(" $1,234.50 ").unwrap(), d("1234.50"));
        assert_eq!(parse_money("(12.00)").unwrap(), d("-12.00"));
        assert_eq!(parse_money("-3").unwrap(), d("-3"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_money("").is_err());
        assert!(parse_money("$").is_err());
        assert!(parse_money("twelve").is_err());
        assert!(parse_money("1.2.3").is_err());
    }

    #[test]
    fn percent_is_unrounded() {
        assert_eq!(percent_of(d("10.00"), d("8.25")), d("0.825"));
    }
}
