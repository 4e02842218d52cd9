//! Decimal numbers kept as text

use crate::{Error, Result};
use std::{fmt, str::FromStr};

/**
    A decimal number that preserves every digit it was created with.

    The value is validated decimal text: an optional sign, digits and an optional
    fractional part. Exponents are rejected, so a `Number` never turns into
    scientific notation on the way to the database and back.

    # Example

    ```
    use augur::Number;

    let num : Number = "1234567890123456789012".parse()?;
    assert_eq!(num.as_str(), "1234567890123456789012");
    assert!(num.to_i64().is_none());

    let num = Number::from(u64::MAX);
    assert_eq!(num.to_string(), "18446744073709551615");

    assert!("1e10".parse::<Number>().is_err());
    # Ok::<(),augur::Error>(())
    ```
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Number(String);

impl Number {
    /// Returns the decimal text of this number
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the number has no fractional part
    pub fn is_integer(&self) -> bool {
        !self.0.contains('.')
    }

    /// Converts the number to `i64` if it is an integer that fits
    pub fn to_i64(&self) -> Option<i64> {
        if self.is_integer() { self.0.parse().ok() } else { None }
    }

    /// Converts the number to `u64` if it is a non-negative integer that fits
    pub fn to_u64(&self) -> Option<u64> {
        if self.is_integer() { self.0.parse().ok() } else { None }
    }

    /// Converts the number to `i128` if it is an integer that fits
    pub fn to_i128(&self) -> Option<i128> {
        if self.is_integer() { self.0.parse().ok() } else { None }
    }

    /// Converts the number to the nearest `f64`. This might lose precision.
    pub fn to_f64(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }

    /// Creates a number from a float.
    ///
    /// Fails for NaN and infinities which have no decimal representation.
    pub fn from_f64(val: f64) -> Result<Self> {
        if val.is_finite() {
            // `f64` Display never switches to exponent notation
            Ok(Number(val.to_string()))
        } else {
            Err(Error::mismatch(format!("{} cannot be represented as a decimal number", val)))
        }
    }

    fn validate(txt: &str) -> bool {
        let digits = txt.strip_prefix('-').or_else(|| txt.strip_prefix('+')).unwrap_or(txt);
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (digits, None),
        };
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        let has_digits = !int_part.is_empty() || frac_part.map_or(false, |frac| !frac.is_empty());
        has_digits && all_digits(int_part) && frac_part.map_or(true, all_digits)
    }
}

impl FromStr for Number {
    type Err = Error;

    fn from_str(txt: &str) -> Result<Self> {
        let txt = txt.trim();
        if Self::validate(txt) {
            Ok(Number(txt.to_string()))
        } else {
            Err(Error::mismatch(format!("{:?} is not a decimal number", txt)))
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Number {
                fn from(val: $t) -> Self {
                    Number(val.to_string())
                }
            }
        )+
    };
}

impl_from_int!{ i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize }
