use std::str::FromStr;

use rust_decimal::{prelude::FromPrimitive, Decimal, RoundingStrategy};
use serde_json::Value;

/// A monetary value as it reaches us: a float, a JSON number, or a NUMERIC
/// column serialized as text. Non-finite or unparsable input has no value.
pub trait MoneyValue {
    fn money_value(&self) -> Option<f64>;
}

impl MoneyValue for f64 {
    fn money_value(&self) -> Option<f64> {
        Some(*self).filter(|value| value.is_finite())
    }
}

impl MoneyValue for str {
    fn money_value(&self) -> Option<f64> {
        self.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }
}

impl MoneyValue for String {
    fn money_value(&self) -> Option<f64> {
        self.as_str().money_value()
    }
}

impl MoneyValue for Value {
    fn money_value(&self) -> Option<f64> {
        match self {
            Value::Number(number) => number.as_f64().filter(|value| value.is_finite()),
            Value::String(text) => text.money_value(),
            _ => None,
        }
    }
}

impl<T: MoneyValue> MoneyValue for Option<T> {
    fn money_value(&self) -> Option<f64> {
        self.as_ref().and_then(MoneyValue::money_value)
    }
}

impl<T: MoneyValue + ?Sized> MoneyValue for &T {
    fn money_value(&self) -> Option<f64> {
        (**self).money_value()
    }
}

/// `$1,234.56`, `-$100.25`; anything without a finite value renders `$0.00`.
pub fn to_usd(value: impl MoneyValue) -> String {
    format_money(value.money_value().unwrap_or(0.0), "$")
}

/// Same as [`to_usd`] without the dollar sign: `1,234.56`.
pub fn to_usd_no_symbol(value: impl MoneyValue) -> String {
    format_money(value.money_value().unwrap_or(0.0), "")
}

/// Parses display text back to a number, ignoring `$`, commas and
/// whitespace. Unparsable text yields 0.
pub fn from_usd(text: &str) -> f64 {
    let cleaned = text
        .chars()
        .filter(|character| !matches!(character, '$' | ',') && !character.is_whitespace())
        .collect::<String>();
    cleaned.as_str().money_value().unwrap_or(0.0)
}

/// Null, missing or unparsable → 0.
pub fn safe_numeric(value: impl MoneyValue) -> f64 {
    value.money_value().unwrap_or(0.0)
}

/// Half-up rounding to cents, on the decimal form of the value.
pub fn round_cents(amount: f64) -> f64 {
    match to_decimal(amount) {
        Some(decimal) => decimal
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .to_string()
            .parse::<f64>()
            .unwrap_or(0.0),
        None => (amount * 100.0).round() / 100.0,
    }
}

fn to_decimal(amount: f64) -> Option<Decimal> {
    if !amount.is_finite() {
        return None;
    }
    // The shortest round-trip text keeps 1.005 as 1.005 instead of 1.00499…
    Decimal::from_str(&amount.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(amount))
}

fn format_money(amount: f64, symbol: &str) -> String {
    let (negative, digits) = match to_decimal(amount) {
        Some(decimal) => {
            let mut rounded =
                decimal.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(2);
            let negative = rounded.is_sign_negative() && !rounded.is_zero();
            (negative, rounded.abs().to_string())
        }
        None if amount.is_finite() => (amount < 0.0, format!("{:.2}", amount.abs())),
        None => (false, "0.00".to_string()),
    };

    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));
    let sign = if negative { "-" } else { "" };
    format!("{sign}{symbol}{}.{fraction}", group_thousands(whole))
}

fn group_thousands(whole: &str) -> String {
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    use super::{from_usd, round_cents, safe_numeric, to_decimal, to_usd, to_usd_no_symbol};

    #[test]
    fn formats_with_symbol_and_separators() {
        assert_eq!(to_usd(1234.56), "$1,234.56");
        assert_eq!(to_usd(-100.25), "-$100.25");
        assert_eq!(to_usd(0.0), "$0.00");
        assert_eq!(to_usd(1_234_567.8), "$1,234,567.80");
        assert_eq!(to_usd(999.999), "$1,000.00");
    }

    #[test]
    fn non_finite_formats_as_zero() {
        assert_eq!(to_usd(f64::NAN), "$0.00");
        assert_eq!(to_usd(f64::INFINITY), "$0.00");
        assert_eq!(to_usd("abc"), "$0.00");
        assert_eq!(to_usd(&Value::Null), "$0.00");
    }

    #[test]
    fn rounds_half_up_to_cents() {
        assert_eq!(to_usd(10.999), "$11.00");
        assert_eq!(to_usd(100.129), "$100.13");
        assert_eq!(to_usd(1.005), "$1.01");
        assert_eq!(to_usd(2.675), "$2.68");
        assert_eq!(to_usd(-0.001), "$0.00");
        assert_eq!(round_cents(1.005), 1.01);
        assert_eq!(round_cents(-2.345), -2.35);
    }

    #[test]
    fn decimal_form_keeps_shortest_representation() {
        assert_eq!(to_decimal(1.005), Some(dec!(1.005)));
        assert_eq!(to_decimal(-2.675), Some(dec!(-2.675)));
        assert_eq!(to_decimal(f64::NAN), None);
    }

    #[test]
    fn accepts_numeric_text_columns() {
        assert_eq!(to_usd("1500.5"), "$1,500.50");
        assert_eq!(to_usd(&json!("  -42 ")), "-$42.00");
        assert_eq!(to_usd_no_symbol(&json!(98765.4321)), "98,765.43");
    }

    #[test]
    fn parses_display_text() {
        assert_eq!(from_usd("$1,234.56"), 1234.56);
        assert_eq!(from_usd(" -$100.25 "), -100.25);
        assert_eq!(from_usd("1,000"), 1000.0);
        assert_eq!(from_usd("n/a"), 0.0);
        assert_eq!(from_usd(""), 0.0);
    }

    #[test]
    fn formatted_text_parses_back_to_cents() {
        for value in [0.0, 0.01, 7.5, 1234.56, 100.129, 52_000.995, 3_000_000.1] {
            let recovered = from_usd(&to_usd_no_symbol(value));
            assert!(
                (recovered - round_cents(value)).abs() < 1e-9,
                "{value} -> {recovered}"
            );
        }
    }

    #[test]
    fn safe_numeric_defaults_to_zero() {
        assert_eq!(safe_numeric(&json!("12.5")), 12.5);
        assert_eq!(safe_numeric(&json!(3)), 3.0);
        assert_eq!(safe_numeric(None::<&Value>), 0.0);
        assert_eq!(safe_numeric(&json!("twelve")), 0.0);
        assert_eq!(safe_numeric(&json!({"amount": 1})), 0.0);
    }
}
