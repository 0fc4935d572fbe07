use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Converts a raw `f64` DB column into a `Decimal`, the shared fallback used by every
/// `*Row -> Public` conversion in the store layer. Not-finite inputs collapse to zero
/// rather than panicking, matching the teacher's `unwrap_or_default()` idiom.
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

pub fn f64_from_decimal(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}
