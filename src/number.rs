//! Unified numeric type.
//!
//! A [`Number`] is either an exact integer or a float. Binary operations
//! promote to float when either operand is a float and stay exact otherwise;
//! integer overflow and zero denominators are reported as
//! [`Error::ArithmeticError`] instead of wrapping or producing infinities.

use std::cmp::Ordering;
use std::fmt;

use crate::Error;

/// Type alias for the exact integer representation
pub type IntType = i64;

#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(IntType),
    Float(f64),
}

/// Relative tolerance used when a float takes part in an equality test
const FLOAT_TOLERANCE: f64 = f64::EPSILON;

fn floats_equal(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= FLOAT_TOLERANCE * scale
}

macro_rules! checked_binary_op {
    ($name:ident, $int_op:ident, $float_op:tt, $what:literal) => {
        pub fn $name(self, other: Number) -> Result<Number, Error> {
            match (self, other) {
                (Number::Int(a), Number::Int(b)) => a
                    .$int_op(b)
                    .map(Number::Int)
                    .ok_or_else(|| Error::ArithmeticError(concat!("Integer overflow in ", $what).into())),
                (a, b) => Ok(Number::Float(a.as_f64() $float_op b.as_f64())),
            }
        }
    };
}

impl Number {
    pub fn is_int(&self) -> bool {
        matches!(self, Number::Int(_))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            #[expect(clippy::cast_precision_loss)] // promotion to float is the documented semantics
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Number::Int(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    checked_binary_op!(checked_add, checked_add, +, "addition");
    checked_binary_op!(checked_sub, checked_sub, -, "subtraction");
    checked_binary_op!(checked_mul, checked_mul, *, "multiplication");

    /// Integer division when both operands are integers, float division otherwise
    pub fn checked_div(self, other: Number) -> Result<Number, Error> {
        if other.is_zero() {
            return Err(Error::ArithmeticError("Division by zero".into()));
        }
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_div(b)
                .map(Number::Int)
                .ok_or_else(|| Error::ArithmeticError("Integer overflow in division".into())),
            (a, b) => Ok(Number::Float(a.as_f64() / b.as_f64())),
        }
    }

    /// Floored modulus: the result takes the sign of the divisor
    pub fn checked_mod(self, other: Number) -> Result<Number, Error> {
        if other.is_zero() {
            return Err(Error::ArithmeticError("Division by zero".into()));
        }
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                let r = a
                    .checked_rem(b)
                    .ok_or_else(|| Error::ArithmeticError("Integer overflow in modulus".into()))?;
                Ok(Number::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let r = a % b;
                Ok(Number::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
            }
        }
    }

    pub fn checked_neg(self) -> Result<Number, Error> {
        Number::Int(0).checked_sub(self).map(|n| match (self, n) {
            // -0.0 rather than 0.0 - x for floats
            (Number::Float(f), _) => Number::Float(-f),
            (_, n) => n,
        })
    }

    /// Ordering used for both comparison builtins and value ordering.
    /// Floats that are fuzzily equal compare as `Equal`; NaN sorts last.
    pub fn total_cmp(&self, other: &Number) -> Ordering {
        match (*self, *other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                if floats_equal(a, b) {
                    Ordering::Equal
                } else {
                    a.total_cmp(&b)
                }
            }
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => floats_equal(a.as_f64(), b.as_f64()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.as_f64().is_nan() || other.as_f64().is_nan() {
            return None;
        }
        Some(self.total_cmp(other))
    }
}

impl From<IntType> for Number {
    fn from(n: IntType) -> Self {
        Number::Int(n)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            // Debug formatting keeps the fractional part: 3.0 prints as "3.0"
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    use Number::{Float, Int};

    #[test]
    fn test_promotion_rules() {
        let cases = vec![
            (Int(1).checked_add(Int(2)).unwrap(), Int(3)),
            (Int(1).checked_add(Float(2.0)).unwrap(), Float(3.0)),
            (Float(1.5).checked_mul(Int(2)).unwrap(), Float(3.0)),
            (Int(7).checked_div(Int(2)).unwrap(), Int(3)),
            (Int(7).checked_div(Float(2.0)).unwrap(), Float(3.5)),
            (Int(-7).checked_mod(Int(3)).unwrap(), Int(2)),
            (Int(7).checked_mod(Int(-3)).unwrap(), Int(-2)),
            (Int(5).checked_neg().unwrap(), Int(-5)),
            (Float(2.5).checked_neg().unwrap(), Float(-2.5)),
        ];

        for (i, (actual, expected)) in cases.into_iter().enumerate() {
            assert_eq!(actual, expected, "case #{}", i + 1);
            assert_eq!(actual.is_int(), expected.is_int(), "case #{} kind", i + 1);
        }
    }

    #[test]
    fn test_arithmetic_errors() {
        let cases = vec![
            Int(1).checked_div(Int(0)),
            Float(1.0).checked_div(Float(0.0)),
            Int(1).checked_div(Float(0.0)),
            Int(1).checked_mod(Int(0)),
            Int(IntType::MAX).checked_add(Int(1)),
            Int(IntType::MIN).checked_sub(Int(1)),
            Int(IntType::MIN).checked_neg(),
            Int(IntType::MIN).checked_div(Int(-1)),
        ];

        for (i, result) in cases.into_iter().enumerate() {
            assert!(
                matches!(result, Err(Error::ArithmeticError(_))),
                "case #{}: expected ArithmeticError, got {result:?}",
                i + 1
            );
        }
    }

    #[test]
    fn test_equality_and_ordering() {
        assert_eq!(Int(3), Float(3.0));
        assert_eq!(Float(0.1 + 0.2), Float(0.3));
        assert_ne!(Int(3), Int(4));
        assert_ne!(Float(3.0), Float(3.001));
        assert_eq!(Int(1).partial_cmp(&Float(1.5)), Some(Ordering::Less));
        assert_eq!(Float(f64::NAN).partial_cmp(&Int(1)), None);
        assert_eq!(Int(10).total_cmp(&Int(2)), Ordering::Greater);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Int(-42)), "-42");
        assert_eq!(format!("{}", Float(3.0)), "3.0");
        assert_eq!(format!("{}", Float(0.25)), "0.25");
    }
}
