//! The numeric domain of grid cells.
//!
//! Every chunk encoding is generic over a [`CellValue`]. The trait only asks for
//! what the encodings and the statistics need: a total order (values key sorted
//! bucket maps), an exact conversion for sums, and a lossy conversion to `f64`
//! for means and deviations.

use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};
use ordered_float::OrderedFloat;

/// Totally ordered 64-bit float cell value.
pub type F64 = OrderedFloat<f64>;
/// Totally ordered 32-bit float cell value.
pub type F32 = OrderedFloat<f32>;

/// A numeric kind that can be stored in grid cells.
pub trait CellValue: Clone + Ord + fmt::Debug + 'static {
    /// Short name of the kind, used in log lines.
    const KIND: &'static str;

    /// The additive identity.
    fn zero_value() -> Self;

    /// Exact rational representation of the value.
    ///
    /// Non-finite floats have no exact value and convert to zero, so they
    /// contribute nothing to exact sums.
    fn to_exact(&self) -> BigRational;

    /// Nearest `f64` to the value.
    fn to_f64(&self) -> f64;

    /// Bytes owned on the heap by this value, beyond `size_of::<Self>()`.
    fn heap_bytes(&self) -> usize {
        0
    }

    fn is_zero_value(&self) -> bool {
        *self == Self::zero_value()
    }
}

impl CellValue for i32 {
    const KIND: &'static str = "i32";

    fn zero_value() -> Self {
        0
    }

    fn to_exact(&self) -> BigRational {
        BigRational::from_integer(BigInt::from(*self))
    }

    fn to_f64(&self) -> f64 {
        f64::from(*self)
    }
}

impl CellValue for i64 {
    const KIND: &'static str = "i64";

    fn zero_value() -> Self {
        0
    }

    fn to_exact(&self) -> BigRational {
        BigRational::from_integer(BigInt::from(*self))
    }

    fn to_f64(&self) -> f64 {
        *self as f64
    }
}

impl CellValue for F32 {
    const KIND: &'static str = "f32";

    fn zero_value() -> Self {
        OrderedFloat(0.0)
    }

    fn to_exact(&self) -> BigRational {
        BigRational::from_float(self.0).unwrap_or_else(BigRational::zero)
    }

    fn to_f64(&self) -> f64 {
        f64::from(self.0)
    }
}

impl CellValue for F64 {
    const KIND: &'static str = "f64";

    fn zero_value() -> Self {
        OrderedFloat(0.0)
    }

    fn to_exact(&self) -> BigRational {
        BigRational::from_float(self.0).unwrap_or_else(BigRational::zero)
    }

    fn to_f64(&self) -> f64 {
        self.0
    }
}

impl CellValue for BigRational {
    const KIND: &'static str = "rational";

    fn zero_value() -> Self {
        BigRational::zero()
    }

    fn to_exact(&self) -> BigRational {
        self.clone()
    }

    fn to_f64(&self) -> f64 {
        ToPrimitive::to_f64(self).unwrap_or(f64::NAN)
    }

    fn heap_bytes(&self) -> usize {
        ((self.numer().bits() + self.denom().bits()) / 8) as usize
    }
}

/// Exact rational for a cell count.
pub fn exact_count(count: u64) -> BigRational {
    BigRational::from_integer(BigInt::from(count))
}

/// Nearest `f64` to an exact rational.
pub fn exact_to_f64(value: &BigRational) -> f64 {
    ToPrimitive::to_f64(value).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_exact() {
        assert_eq!(7i32.to_exact(), BigRational::from_integer(BigInt::from(7)));
        assert_eq!(CellValue::to_f64(&-9999i64), -9999.0);
        assert!(0i32.is_zero_value());
        assert!(!5i64.is_zero_value());
    }

    #[test]
    fn test_float_exact_sum_has_no_rounding() {
        // 0.1 + 0.2 != 0.3 in f64, but the exact sum of the two binary values is
        // representable without loss.
        let a = OrderedFloat(0.1f64).to_exact();
        let b = OrderedFloat(0.2f64).to_exact();
        let sum = a + b;
        assert_eq!(sum, BigRational::from_float(0.1f64).unwrap() + BigRational::from_float(0.2f64).unwrap());
        assert!((exact_to_f64(&sum) - 0.3).abs() < 1e-15);
    }

    #[test]
    fn test_non_finite_float_is_zero() {
        assert_eq!(OrderedFloat(f64::NAN).to_exact(), BigRational::zero());
        assert_eq!(OrderedFloat(f32::INFINITY).to_exact(), BigRational::zero());
    }

    #[test]
    fn test_rational_kind() {
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert_eq!(CellValue::to_f64(&half), 0.5);
        assert!(BigRational::zero().is_zero());
        assert_eq!(<BigRational as CellValue>::KIND, "rational");
    }

    #[test]
    fn test_float_order_is_total() {
        let mut values = vec![OrderedFloat(2.5f64), OrderedFloat(-1.0), OrderedFloat(0.0)];
        values.sort();
        assert_eq!(values, vec![OrderedFloat(-1.0), OrderedFloat(0.0), OrderedFloat(2.5)]);
    }
}
