//! Currency arithmetic helpers
//!
//! All ledger and invoice amounts are `Decimal` values carrying at most two
//! fractional digits. Comparisons between sums go through [`approx_eq`] with a
//! fixed one-cent tolerance, never exact equality.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// One cent: the tolerance for debit/credit and total comparisons
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("Importe no válido: '{0}'")]
    InvalidAmount(String),

    #[error("Importe fuera de rango: {0}")]
    OutOfRange(Decimal),
}

/// Round to cents, half away from zero
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn approx_eq(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= EPSILON
}

/// Debit/credit totals balance when they differ by at most one cent
pub fn is_balanced(total_debit: Decimal, total_credit: Decimal) -> bool {
    approx_eq(total_debit, total_credit)
}

pub fn has_at_most_two_decimals(value: Decimal) -> bool {
    value.normalize().scale() <= 2
}

/// Build an amount from an integer count of cents
pub fn from_minor(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Convert an amount to cents, rounding first
pub fn to_minor(value: Decimal) -> Result<i64, MoneyError> {
    (round2(value) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or(MoneyError::OutOfRange(value))
}

/// Parse an amount written the Spanish way: `1.234,56`, `-12,5`, `300 €`.
///
/// Dots are thousands separators and must group digits in threes; the comma
/// is the decimal separator and may be followed by one or two digits.
pub fn parse_spanish_amount(input: &str) -> Result<Decimal, MoneyError> {
    let invalid = || MoneyError::InvalidAmount(input.to_string());

    let trimmed = input.trim();
    let trimmed = trimmed.strip_suffix('€').unwrap_or(trimmed).trim_end();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if body.is_empty() {
        return Err(invalid());
    }

    let mut parts = body.split(',');
    let integer_part = parts.next().unwrap_or_default();
    let fraction_part = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }

    let integer_digits = strip_thousands(integer_part).ok_or_else(invalid)?;

    let fraction_digits = match fraction_part {
        Some(f) if !f.is_empty() && f.len() <= 2 && f.chars().all(|c| c.is_ascii_digit()) => f,
        Some(_) => return Err(invalid()),
        None => "",
    };

    let canonical = if fraction_digits.is_empty() {
        integer_digits
    } else {
        format!("{}.{}", integer_digits, fraction_digits)
    };

    let value: Decimal = canonical.parse().map_err(|_| invalid())?;
    Ok(if negative { -value } else { value })
}

/// Remove dot thousands separators, checking the grouping
fn strip_thousands(integer_part: &str) -> Option<String> {
    if integer_part.is_empty() {
        return None;
    }
    let groups: Vec<&str> = integer_part.split('.').collect();
    for (idx, group) in groups.iter().enumerate() {
        if group.is_empty() || !group.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if idx == 0 && groups.len() > 1 && group.len() > 3 {
            return None;
        }
        if idx > 0 && group.len() != 3 {
            return None;
        }
    }
    Some(groups.concat())
}

/// Render an amount as `1.234,56`
pub fn format_spanish_amount(value: Decimal) -> String {
    let rounded = round2(value);
    let plain = format!("{:.2}", rounded.abs());
    let (integer, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (idx, ch) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{}{},{}", sign, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_epsilon_is_one_cent() {
        assert_eq!(EPSILON, d("0.01"));
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(d("2.345")), d("2.35"));
        assert_eq!(round2(d("-2.345")), d("-2.35"));
        assert_eq!(round2(d("2.344")), d("2.34"));
    }

    #[test]
    fn test_balance_tolerance() {
        assert!(is_balanced(d("100.00"), d("100.01")));
        assert!(!is_balanced(d("100.00"), d("100.02")));
    }

    #[test]
    fn test_decimal_places() {
        assert!(has_at_most_two_decimals(d("10.50")));
        assert!(has_at_most_two_decimals(d("10.500")));
        assert!(!has_at_most_two_decimals(d("10.505")));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(from_minor(12345), d("123.45"));
        assert_eq!(to_minor(d("123.455")).unwrap(), 12346);
    }

    #[test]
    fn test_parse_spanish_amounts() {
        assert_eq!(parse_spanish_amount("1.234,56").unwrap(), d("1234.56"));
        assert_eq!(parse_spanish_amount("-1.234,56").unwrap(), d("-1234.56"));
        assert_eq!(parse_spanish_amount("1234,5").unwrap(), d("1234.5"));
        assert_eq!(parse_spanish_amount("300 €").unwrap(), d("300"));
        assert_eq!(parse_spanish_amount("1.000.000").unwrap(), d("1000000"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "abc", "1,2,3", "12.34", "1.2345,00", "1,234", "-", "1..000"] {
            assert!(parse_spanish_amount(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_format_spanish_amount() {
        assert_eq!(format_spanish_amount(d("1234.5")), "1.234,50");
        assert_eq!(format_spanish_amount(d("-1234567.891")), "-1.234.567,89");
        assert_eq!(format_spanish_amount(d("0")), "0,00");
        assert_eq!(format_spanish_amount(d("999")), "999,00");
    }
}
