//! A thin `BigDecimal` wrapper for currency amounts. Wallet balances and
//! payment amounts are exact decimal quantities (§3); using `f64` anywhere
//! near a ledger invites the kind of balance drift the wallet invariant in
//! §8 explicitly forbids.

use {
    bigdecimal::BigDecimal,
    serde::{Deserialize, Serialize},
    std::{
        fmt,
        ops::{Add, Sub},
        str::FromStr,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub BigDecimal);

impl Money {
    pub fn zero() -> Self {
        Money(BigDecimal::from(0))
    }

    pub fn from_major(amount: f64) -> Self {
        Money(BigDecimal::try_from(amount).unwrap_or_else(|_| BigDecimal::from(0)))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > BigDecimal::from(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigDecimal::from(0)
    }

    /// Multiplies by a plain ratio (e.g. a surge multiplier or commission
    /// rate) and rounds to 2 decimal places, matching the "2 dp" rounding
    /// called out throughout §4.1/§4.3.
    pub fn scaled(&self, ratio: f64) -> Money {
        let ratio = BigDecimal::try_from(ratio).unwrap_or_else(|_| BigDecimal::from(1));
        Money(bigdecimal::RoundingMode::HalfUp.round_to(&(&self.0 * ratio), 2))
    }

    pub fn as_f64(&self) -> f64 {
        bigdecimal::ToPrimitive::to_f64(&self.0).unwrap_or(0.0)
    }
}

trait RoundExt {
    fn round_to(&self, value: &BigDecimal, places: i64) -> BigDecimal;
}

impl RoundExt for bigdecimal::RoundingMode {
    fn round_to(&self, value: &BigDecimal, places: i64) -> BigDecimal {
        value.with_scale_round(places, *self)
    }
}

impl Add for &Money {
    type Output = Money;
    fn add(self, rhs: Self) -> Money {
        Money(&self.0 + &rhs.0)
    }
}

impl Sub for &Money {
    type Output = Money;
    fn sub(self, rhs: Self) -> Money {
        Money(&self.0 - &rhs.0)
    }
}

impl FromStr for Money {
    type Err = bigdecimal::ParseBigDecimalError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Money(BigDecimal::from_str(s)?))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<BigDecimal> for Money {
    fn from(value: BigDecimal) -> Self {
        Money(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_rounds_to_two_decimals() {
        let m = Money::from_major(100.0);
        assert_eq!(m.scaled(0.9).to_string(), "90.00");
    }

    #[test]
    fn display_always_shows_two_decimals() {
        let m: Money = "70".parse().unwrap();
        assert_eq!(m.to_string(), "70.00");
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(!Money::zero().is_positive());
        assert!(Money::zero().is_zero());
    }
}
