//! Fixed-point decimal arithmetic with 18 fractional digits.
//!
//! All rate and ratio computations that affect state go through [`Dec`]. Products and quotients
//! are computed in 256-bit space so that any `u128` amount can be scaled by any rate without
//! intermediate overflow. Every operation truncates toward zero unless its name says otherwise.

use std::{fmt, str::FromStr};

use ethnum::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DecError;

/// Number of fractional digits carried by a [`Dec`].
pub const DECIMAL_PRECISION: usize = 18;

/// `10^18` i.e., the atomic representation of `1.0`.
const ONE_ATOMS: u128 = 1_000_000_000_000_000_000;

const fn one() -> U256 {
    U256::new(ONE_ATOMS)
}

fn to_u128(value: U256) -> Result<u128, DecError> {
    let (hi, lo) = value.into_words();
    if hi != 0 {
        return Err(DecError::Overflow);
    }

    Ok(lo)
}

/// A non-negative fixed-point decimal with [`DECIMAL_PRECISION`] fractional digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(U256);

impl Dec {
    /// `0.0`
    pub const ZERO: Dec = Dec(U256::ZERO);

    /// `1.0`
    pub const ONE: Dec = Dec(one());

    /// Creates a decimal from an integer.
    pub fn from_int(value: u128) -> Self {
        // cannot overflow: u128::MAX * 10^18 < 2^256
        Dec(U256::new(value) * one())
    }

    /// Creates the decimal `numerator / denominator`, truncated.
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self, DecError> {
        if denominator == 0 {
            return Err(DecError::DivisionByZero);
        }

        Ok(Dec(U256::new(numerator) * one() / U256::new(denominator)))
    }

    /// Creates the decimal `percent / 100`.
    pub fn from_percent(percent: u64) -> Self {
        Dec(U256::new(u128::from(percent)) * one() / U256::new(100))
    }

    /// Returns `true` if the decimal is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0 == U256::ZERO
    }

    /// Adds two decimals.
    pub fn checked_add(self, other: Dec) -> Result<Dec, DecError> {
        self.0.checked_add(other.0).map(Dec).ok_or(DecError::Overflow)
    }

    /// Subtracts `other` from `self`, failing if the result would be negative.
    pub fn checked_sub(self, other: Dec) -> Result<Dec, DecError> {
        self.0.checked_sub(other.0).map(Dec).ok_or(DecError::Negative)
    }

    /// Returns `|self - other|`.
    pub fn abs_diff(self, other: Dec) -> Dec {
        if self >= other {
            Dec(self.0 - other.0)
        } else {
            Dec(other.0 - self.0)
        }
    }

    /// Multiplies two decimals, truncating the result.
    pub fn checked_mul(self, other: Dec) -> Result<Dec, DecError> {
        let product = self.0.checked_mul(other.0).ok_or(DecError::Overflow)?;
        Ok(Dec(product / one()))
    }

    /// Divides `self` by `other`, truncating the result.
    pub fn checked_quo(self, other: Dec) -> Result<Dec, DecError> {
        if other.is_zero() {
            return Err(DecError::DivisionByZero);
        }

        let scaled = self.0.checked_mul(one()).ok_or(DecError::Overflow)?;
        Ok(Dec(scaled / other.0))
    }

    /// Computes `amount * self`, truncated toward zero.
    pub fn mul_int_truncate(self, amount: u128) -> Result<u128, DecError> {
        let product = U256::new(amount)
            .checked_mul(self.0)
            .ok_or(DecError::Overflow)?;
        to_u128(product / one())
    }

    /// Computes `amount * self`, rounded up.
    pub fn mul_int_ceil(self, amount: u128) -> Result<u128, DecError> {
        let product = U256::new(amount)
            .checked_mul(self.0)
            .ok_or(DecError::Overflow)?;
        let rounded = product
            .checked_add(one() - U256::ONE)
            .ok_or(DecError::Overflow)?;
        to_u128(rounded / one())
    }

    /// Computes `amount / self`, truncated toward zero.
    pub fn int_quo_truncate(self, amount: u128) -> Result<u128, DecError> {
        if self.is_zero() {
            return Err(DecError::DivisionByZero);
        }

        to_u128(U256::new(amount) * one() / self.0)
    }

    /// Returns the integer part of the decimal.
    pub fn truncate_int(self) -> Result<u128, DecError> {
        to_u128(self.0 / one())
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / one();
        let (_, frac) = (self.0 % one()).into_words();
        write!(f, "{int}.{frac:0width$}", width = DECIMAL_PRECISION)
    }
}

impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({self})")
    }
}

impl FromStr for Dec {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecError::InvalidString(s.to_string());

        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(invalid());
        }

        if frac_part.len() > DECIMAL_PRECISION {
            return Err(DecError::TooPrecise(s.to_string()));
        }

        let int = if int_part.is_empty() {
            0
        } else {
            int_part.parse::<u128>().map_err(|_| invalid())?
        };

        let frac = if frac_part.is_empty() {
            0
        } else {
            format!("{frac_part:0<width$}", width = DECIMAL_PRECISION)
                .parse::<u128>()
                .map_err(|_| invalid())?
        };

        Ok(Dec(U256::new(int) * one() + U256::new(frac)))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn dec(s: &str) -> Dec {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("1").to_string(), "1.000000000000000000");
        assert_eq!(dec("0.9").to_string(), "0.900000000000000000");
        assert_eq!(dec(".5").to_string(), "0.500000000000000000");
        assert_eq!(dec("12.000000000000000001").to_string(), "12.000000000000000001");

        assert!(matches!("".parse::<Dec>(), Err(DecError::InvalidString(_))));
        assert!(matches!("1.2.3".parse::<Dec>(), Err(DecError::InvalidString(_))));
        assert!(matches!("-1".parse::<Dec>(), Err(DecError::InvalidString(_))));
        assert!(matches!(
            "0.0000000000000000001".parse::<Dec>(),
            Err(DecError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_constructors() {
        assert_eq!(Dec::from_int(3), dec("3"));
        assert_eq!(Dec::from_percent(90), dec("0.9"));
        assert_eq!(Dec::from_ratio(1, 3).unwrap(), dec("0.333333333333333333"));
        assert_eq!(Dec::from_ratio(1, 0), Err(DecError::DivisionByZero));
        assert_eq!(Dec::ONE, dec("1.0"));
        assert!(Dec::ZERO.is_zero());
    }

    #[test]
    fn test_rounding_directions() {
        let rate = dec("1.5");
        assert_eq!(rate.mul_int_truncate(3).unwrap(), 4);
        assert_eq!(rate.mul_int_ceil(3).unwrap(), 5);
        assert_eq!(rate.mul_int_ceil(2).unwrap(), 3);
        assert_eq!(rate.int_quo_truncate(10).unwrap(), 6);
        assert_eq!(Dec::ZERO.int_quo_truncate(10), Err(DecError::DivisionByZero));
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(dec("0.5").checked_add(dec("0.25")).unwrap(), dec("0.75"));
        assert_eq!(dec("0.5").checked_sub(dec("0.75")), Err(DecError::Negative));
        assert_eq!(dec("0.5").abs_diff(dec("0.75")), dec("0.25"));
        assert_eq!(dec("1.5").checked_mul(dec("2")).unwrap(), dec("3"));
        assert_eq!(dec("1").checked_quo(dec("3")).unwrap(), dec("0.333333333333333333"));
        assert_eq!(dec("1").checked_quo(Dec::ZERO), Err(DecError::DivisionByZero));
        assert_eq!(dec("7.99").truncate_int().unwrap(), 7);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&dec("1.05")).unwrap();
        assert_eq!(json, "\"1.050000000000000000\"");
        let back: Dec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dec("1.05"));
    }

    proptest! {
        #[test]
        fn mul_int_truncate_never_exceeds_exact(
            amount in 0u128..1_000_000_000_000_000u128,
            num in 1u128..10_000u128,
            den in 1u128..10_000u128,
        ) {
            let rate = Dec::from_ratio(num, den).unwrap();
            let truncated = rate.mul_int_truncate(amount).unwrap();
            let ceiled = rate.mul_int_ceil(amount).unwrap();

            prop_assert!(truncated <= ceiled);
            prop_assert!(ceiled - truncated <= 1);
            // rate <= num/den, so amount * rate can never exceed the exact product
            prop_assert!(truncated * den <= amount * num);
        }

        #[test]
        fn mint_then_redeem_loses_at_most_rate_plus_one(
            amount in 0u128..1_000_000_000_000_000u128,
            bps in 5_000u128..20_000u128,
        ) {
            let rate = Dec::from_ratio(bps, 10_000).unwrap();
            let minted = rate.int_quo_truncate(amount).unwrap();
            let redeemed = rate.mul_int_truncate(minted).unwrap();

            prop_assert!(redeemed <= amount);
            prop_assert!(amount - redeemed <= 3);
        }

        #[test]
        fn display_parse_is_identity(atoms in any::<u64>(), int in any::<u32>()) {
            let value = Dec::from_int(u128::from(int))
                .checked_add(Dec::from_ratio(u128::from(atoms), ONE_ATOMS).unwrap())
                .unwrap();
            prop_assert_eq!(value.to_string().parse::<Dec>().unwrap(), value);
        }
    }
}
