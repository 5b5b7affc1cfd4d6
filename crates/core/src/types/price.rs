//! Recipe prices in whole Rupiah.
//!
//! Rupiah has no minor unit in everyday use, so prices are plain integers.
//! The backend stores them in an integer column and the UI renders them with
//! Indonesian digit grouping (`Rp 20.000`).

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use serde::{Deserialize, Serialize};

use super::validation::ValidationError;

/// A price in whole Rupiah.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// The zero price, used as the fallback for rows missing a price.
    pub const ZERO: Self = Self(0);

    /// Create a price without validation.
    ///
    /// Values read back from the backend are trusted as-is.
    #[must_use]
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Create a price that must be strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositivePrice`] for zero or negative amounts.
    pub fn positive(amount: i64) -> Result<Self, ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::NonPositivePrice(amount));
        }
        Ok(Self(amount))
    }

    /// Parse user input such as `25000`, `25.000` or `Rp 25.000` into a
    /// strictly positive price.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPrice`] when the input has no digits or
    /// overflows, and [`ValidationError::NonPositivePrice`] for zero.
    pub fn parse_positive(input: &str) -> Result<Self, ValidationError> {
        let digits: String = input
            .trim()
            .trim_start_matches("Rp")
            .chars()
            .filter(|c| !matches!(c, '.' | ' ' | '_'))
            .collect();

        let amount = digits
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidPrice(input.trim().to_string()))?;

        Self::positive(amount)
    }

    /// Get the amount in Rupiah.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Whether the price is strictly positive.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        if self.0 < 0 {
            write!(f, "-Rp {grouped}")
        } else {
            write!(f, "Rp {grouped}")
        }
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Price> for i64 {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::new(0).to_string(), "Rp 0");
        assert_eq!(Price::new(500).to_string(), "Rp 500");
        assert_eq!(Price::new(20_000).to_string(), "Rp 20.000");
        assert_eq!(Price::new(1_250_000).to_string(), "Rp 1.250.000");
        assert_eq!(Price::new(-1500).to_string(), "-Rp 1.500");
    }

    #[test]
    fn test_positive_rejects_zero_and_negative() {
        assert_eq!(
            Price::positive(0),
            Err(ValidationError::NonPositivePrice(0))
        );
        assert!(Price::positive(-10).is_err());
        assert_eq!(Price::positive(1).unwrap().amount(), 1);
    }

    #[test]
    fn test_parse_positive_accepts_formatted_input() {
        assert_eq!(Price::parse_positive("25000").unwrap(), Price::new(25_000));
        assert_eq!(Price::parse_positive("25.000").unwrap(), Price::new(25_000));
        assert_eq!(Price::parse_positive("Rp 25.000").unwrap(), Price::new(25_000));
    }

    #[test]
    fn test_parse_positive_rejects_garbage() {
        assert!(matches!(
            Price::parse_positive("gratis"),
            Err(ValidationError::InvalidPrice(_))
        ));
        assert!(matches!(
            Price::parse_positive("0"),
            Err(ValidationError::NonPositivePrice(0))
        ));
    }

    #[test]
    fn test_sum() {
        let total: Price = [Price::new(20_000), Price::new(15_000)].into_iter().sum();
        assert_eq!(total, Price::new(35_000));
    }
}
