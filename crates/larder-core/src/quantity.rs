//! # Quantity Module
//!
//! Provides the `Quantity` type for stock levels and recipe amounts.
//!
//! ## Why Fixed-Point Quantities?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE HALF-PORTION PROBLEM                                               │
//! │                                                                         │
//! │  With binary floating point:                                            │
//! │    10.0 - 0.3 - 0.3 - 0.3 = 9.099999999999998  ❌ NOT AUDITABLE         │
//! │                                                                         │
//! │  A "Mini" croffle uses half a croissant. Twenty of them must leave     │
//! │  exactly 0 croissants out of 10, not 1.7e-15.                          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Thousandths                                      │
//! │    10 units  = 10000                                                   │
//! │    0.5 units =   500                                                   │
//! │    10000 - 20 × 500 = 0  ✅ EXACT                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use larder_core::quantity::Quantity;
//!
//! let stock: Quantity = "10".parse().unwrap();
//! let portion: Quantity = "0.5".parse().unwrap();
//!
//! let left = stock - portion * 3;
//! assert_eq!(left.to_string(), "8.5");
//! assert_eq!(left.thousandths(), 8500);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::PortionMultiplier;

// =============================================================================
// Quantity Type
// =============================================================================

/// An amount of stock in thousandths of the item's unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: Movement deltas are negative for deductions
/// - **Thousandths**: Enough for gram-level recipes on kilogram stock
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Quantities Flow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │  IngredientRequirement.base_quantity                                    │
/// │          │  × portion_multiplier  × quantity_sold                       │
/// │          ▼                                                              │
/// │  DeductionPair.quantity ──► ConditionalSubtract ──► InventoryMovement   │
/// │                                                                         │
/// │  InventoryItem.stock_quantity ──► Availability (max sellable)          │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Number of stored steps per whole unit.
    pub const SCALE: i64 = 1000;

    /// Number of fractional digits accepted when parsing.
    const FRACTION_DIGITS: usize = 3;

    /// Creates a quantity from raw thousandths.
    ///
    /// ## Example
    /// ```rust
    /// use larder_core::quantity::Quantity;
    ///
    /// let half = Quantity::from_thousandths(500);
    /// assert_eq!(half.to_string(), "0.5");
    /// ```
    #[inline]
    pub const fn from_thousandths(thousandths: i64) -> Self {
        Quantity(thousandths)
    }

    /// Creates a quantity of whole units.
    ///
    /// ## Example
    /// ```rust
    /// use larder_core::quantity::Quantity;
    ///
    /// assert_eq!(Quantity::from_units(10).thousandths(), 10_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * Self::SCALE)
    }

    /// Returns the raw value in thousandths (the stored representation).
    #[inline]
    pub const fn thousandths(&self) -> i64 {
        self.0
    }

    /// Returns zero quantity.
    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.abs())
    }

    /// Applies a portion multiplier, returning `None` when the result does
    /// not land on a whole thousandth.
    ///
    /// Portions never round. A recipe declaring `0.001` at half portion has
    /// no exact representation and must be fixed by whoever authored it.
    ///
    /// ## Example
    /// ```rust
    /// use larder_core::quantity::Quantity;
    /// use larder_core::types::PortionMultiplier;
    ///
    /// let croissant = Quantity::from_units(1);
    /// let mini = croissant.apply_portion(PortionMultiplier::HALF).unwrap();
    /// assert_eq!(mini.to_string(), "0.5");
    ///
    /// let tiny = Quantity::from_thousandths(1);
    /// assert!(tiny.apply_portion(PortionMultiplier::HALF).is_none());
    /// ```
    pub fn apply_portion(&self, multiplier: PortionMultiplier) -> Option<Quantity> {
        // i128 keeps large stock values from overflowing before the division
        let scaled = self.0 as i128 * multiplier.bps() as i128;
        let denominator = PortionMultiplier::FULL.bps() as i128;
        if scaled % denominator != 0 {
            return None;
        }
        i64::try_from(scaled / denominator).ok().map(Quantity)
    }

    /// Multiplies by a count of units sold, returning `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use larder_core::quantity::Quantity;
    ///
    /// let per_unit = Quantity::from_thousandths(500);
    /// assert_eq!(per_unit.checked_mul_units(3), Some(Quantity::from_thousandths(1500)));
    /// ```
    #[inline]
    pub fn checked_mul_units(&self, units: i64) -> Option<Quantity> {
        self.0.checked_mul(units).map(Quantity)
    }

    /// Checked addition.
    #[inline]
    pub fn checked_add(&self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    /// Checked subtraction.
    #[inline]
    pub fn checked_sub(&self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// How many whole `per_unit` amounts fit into this quantity.
    ///
    /// Returns 0 for a non-positive stock and `None` when `per_unit` is not
    /// positive (nothing to divide by).
    ///
    /// ## Example
    /// ```rust
    /// use larder_core::quantity::Quantity;
    ///
    /// let stock = Quantity::from_units(10);
    /// let per_unit = Quantity::from_thousandths(3000);
    /// assert_eq!(stock.whole_multiples_of(per_unit), Some(3));
    /// ```
    pub fn whole_multiples_of(&self, per_unit: Quantity) -> Option<i64> {
        if !per_unit.is_positive() {
            return None;
        }
        if !self.is_positive() {
            return Some(0);
        }
        Some(self.0 / per_unit.0)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses decimal text exactly ("0.5", "9.5", "12", "-0.25").
///
/// More than three fractional digits is rejected instead of rounded.
impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: reason.to_string(),
        };

        let text = s.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if fraction.len() > Self::FRACTION_DIGITS {
            return Err(invalid("at most 3 decimal places are supported"));
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| invalid("value is too large"))?;

        // Right-pad "5" to "500" so the fraction is always in thousandths
        let mut padded = fraction.to_string();
        while padded.len() < Self::FRACTION_DIGITS {
            padded.push('0');
        }
        let fraction: i64 = padded
            .parse()
            .map_err(|_| invalid("expected a decimal number"))?;

        let magnitude = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(|| invalid("value is too large"))?;

        Ok(Quantity(if negative { -magnitude } else { magnitude }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the shortest exact decimal ("9.5", "10", "0.125").
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        let whole = magnitude / scale;
        let fraction = magnitude % scale;

        if fraction == 0 {
            return write!(f, "{}{}", sign, whole);
        }

        let digits = format!("{:03}", fraction);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

/// Multiplication by a unit count.
impl Mul<i64> for Quantity {
    type Output = Self;

    #[inline]
    fn mul(self, units: i64) -> Self {
        Quantity(self.0 * units)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_exact() {
        assert_eq!(q("0.5").thousandths(), 500);
        assert_eq!(q("9.5").thousandths(), 9500);
        assert_eq!(q("12").thousandths(), 12_000);
        assert_eq!(q("0.125").thousandths(), 125);
        assert_eq!(q("-0.25").thousandths(), -250);
        assert_eq!(q("  3.0 ").thousandths(), 3000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
        assert!(".5".parse::<Quantity>().is_err());
        assert!("1.2.3".parse::<Quantity>().is_err());
        assert!("1e3".parse::<Quantity>().is_err());
        assert!("0.0001".parse::<Quantity>().is_err());
        assert!("99999999999999999999".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Quantity::from_thousandths(9500).to_string(), "9.5");
        assert_eq!(Quantity::from_thousandths(10_000).to_string(), "10");
        assert_eq!(Quantity::from_thousandths(125).to_string(), "0.125");
        assert_eq!(Quantity::from_thousandths(1).to_string(), "0.001");
        assert_eq!(Quantity::from_thousandths(-250).to_string(), "-0.25");
        assert_eq!(Quantity::zero().to_string(), "0");
    }

    #[test]
    fn test_arithmetic() {
        let stock = Quantity::from_units(10);
        let half = q("0.5");

        assert_eq!(stock - half, q("9.5"));
        assert_eq!(stock + half, q("10.5"));
        assert_eq!(half * 3, q("1.5"));
        assert_eq!(-half, q("-0.5"));
        assert_eq!(vec![half, half, half].into_iter().sum::<Quantity>(), q("1.5"));
    }

    /// Repeated half-portion deduction must hit zero exactly.
    #[test]
    fn test_repeated_half_portions_are_exact() {
        let mut stock = Quantity::from_units(10);
        for _ in 0..20 {
            stock -= q("0.5");
        }
        assert!(stock.is_zero());
    }

    #[test]
    fn test_apply_portion() {
        assert_eq!(q("1").apply_portion(PortionMultiplier::HALF), Some(q("0.5")));
        assert_eq!(q("0.5").apply_portion(PortionMultiplier::HALF), Some(q("0.25")));
        assert_eq!(q("0.3").apply_portion(PortionMultiplier::FULL), Some(q("0.3")));
        assert_eq!(q("0.001").apply_portion(PortionMultiplier::HALF), None);
        assert_eq!(
            q("2").apply_portion(PortionMultiplier::from_bps(2500)),
            Some(q("0.5"))
        );
    }

    #[test]
    fn test_whole_multiples_of() {
        assert_eq!(q("10").whole_multiples_of(q("0.5")), Some(20));
        assert_eq!(q("0.3").whole_multiples_of(q("0.5")), Some(0));
        assert_eq!(q("4.5").whole_multiples_of(q("1")), Some(4));
        assert_eq!(q("0").whole_multiples_of(q("1")), Some(0));
        assert_eq!(q("-1").whole_multiples_of(q("1")), Some(0));
        assert_eq!(q("1").whole_multiples_of(q("0")), None);
    }

    #[test]
    fn test_checked_ops() {
        assert_eq!(q("0.5").checked_mul_units(999), Some(q("499.5")));
        assert_eq!(Quantity::from_thousandths(i64::MAX).checked_mul_units(2), None);
        assert_eq!(q("1").checked_sub(q("0.25")), Some(q("0.75")));
        assert_eq!(Quantity::from_thousandths(i64::MAX).checked_add(q("0.001")), None);
    }

    #[test]
    fn test_zero_and_checks() {
        assert!(Quantity::zero().is_zero());
        assert!(q("0.001").is_positive());
        assert!(q("-0.001").is_negative());
        assert_eq!(q("-2").abs(), q("2"));
        assert_eq!(Quantity::default(), Quantity::zero());
    }
}
