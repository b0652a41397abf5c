use std::str::FromStr;

use rust_decimal::Decimal;

pub mod admin;
pub mod payments;
pub mod users;
pub mod withdrawals;

/// Parses a JSON number into a money amount with at most cent precision.
pub fn parse_amount(value: &serde_json::Number) -> Option<Decimal> {
    let amount = Decimal::from_str(&value.to_string()).ok()?.normalize();

    if amount.scale() > 2 {
        return None;
    }

    Some(amount)
}

/// Converts a money amount into provider cents.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;

    (amount * Decimal::ONE_HUNDRED).trunc().to_i64()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(raw: &str) -> serde_json::Number {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn parses_cent_precision_amounts() {
        assert_eq!(parse_amount(&number("50")), Some(Decimal::new(50, 0)));
        assert_eq!(parse_amount(&number("10.5")), Some(Decimal::new(105, 1)));
        assert_eq!(parse_amount(&number("12.34")), Some(Decimal::new(1234, 2)));
        assert_eq!(parse_amount(&number("100.0")), Some(Decimal::new(100, 0)));
        assert_eq!(parse_amount(&number("1.999")), None);
    }

    #[test]
    fn converts_between_amounts_and_cents() {
        assert_eq!(to_cents(Decimal::new(1234, 2)), Some(1234));
        assert_eq!(to_cents(Decimal::new(5, 0)), Some(500));
        assert_eq!(from_cents(2550), Decimal::new(2550, 2));
    }
}
