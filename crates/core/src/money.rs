//! Money and tax value types.
//!
//! All amounts are integer cents (smallest currency unit); tax rates are
//! basis points. Settlement arithmetic never touches floating point.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// An amount in integer cents. Never negative.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Parse a decimal money string ("12", "12.5", "12.50") into cents.
    ///
    /// Rejects negative values, more than two fractional digits, and
    /// anything that is not a plain decimal number.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::validation("amount is required"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!("not a valid amount: {s}")));
        }
        if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!("not a valid amount: {s}")));
        }

        let whole: u64 = whole
            .parse()
            .map_err(|_| DomainError::validation(format!("amount out of range: {s}")))?;

        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().unwrap_or(0) * 10,
            _ => frac.parse::<u64>().unwrap_or(0),
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .map(Money)
            .ok_or_else(|| DomainError::validation(format!("amount out of range: {s}")))
    }

    pub fn checked_add(self, other: Money) -> Result<Money, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Multiply by a line quantity (quantity must be positive).
    pub fn checked_mul_qty(self, qty: i64) -> Result<Money, DomainError> {
        if qty <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        self.0
            .checked_mul(qty as u64)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Sales tax rate in basis points (1500 = 15%).
///
/// Defaults to zero for businesses with no tax configured.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const ZERO: TaxRate = TaxRate(0);

    /// Create a tax rate from basis points. Rates above 100% are rejected.
    pub fn from_basis_points(bps: u32) -> Result<Self, DomainError> {
        if bps > 10_000 {
            return Err(DomainError::validation(format!(
                "tax rate above 100%: {bps} bps"
            )));
        }
        Ok(Self(bps))
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Tax owed on `amount`, truncated toward zero.
    pub fn apply(self, amount: Money) -> Result<Money, DomainError> {
        amount
            .0
            .checked_mul(self.0 as u64)
            .map(|v| Money(v / 10_000))
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }
}

/// Result of settling a booking: tax owed and grand total.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl Totals {
    /// `tax = subtotal × rate`, `total = subtotal + tax`.
    pub fn compute(subtotal: Money, rate: TaxRate) -> Result<Self, DomainError> {
        let tax = rate.apply(subtotal)?;
        let total = subtotal.checked_add(tax)?;
        Ok(Self {
            subtotal,
            tax,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings_to_cents() {
        assert_eq!(Money::parse("12").unwrap().cents(), 1200);
        assert_eq!(Money::parse("12.5").unwrap().cents(), 1250);
        assert_eq!(Money::parse("12.50").unwrap().cents(), 1250);
        assert_eq!(Money::parse("0.07").unwrap().cents(), 7);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", "-1", "1.234", "abc", "1,50", ".5"] {
            assert!(Money::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn fifteen_percent_of_one_hundred() {
        let rate = TaxRate::from_basis_points(1500).unwrap();
        let totals = Totals::compute(Money::from_cents(10_000), rate).unwrap();
        assert_eq!(totals.tax, Money::from_cents(1_500));
        assert_eq!(totals.total, Money::from_cents(11_500));
    }

    #[test]
    fn zero_rate_adds_no_tax() {
        let totals = Totals::compute(Money::from_cents(9_99), TaxRate::ZERO).unwrap();
        assert_eq!(totals.tax, Money::ZERO);
        assert_eq!(totals.total, totals.subtotal);
    }

    #[test]
    fn rejects_rates_above_one_hundred_percent() {
        assert!(TaxRate::from_basis_points(10_001).is_err());
    }

    #[test]
    fn tax_on_an_absurd_amount_errors_instead_of_wrapping() {
        let rate = TaxRate::from_basis_points(1500).unwrap();
        assert!(rate.apply(Money::from_cents(u64::MAX)).is_err());
    }

    #[test]
    fn display_formats_cents() {
        assert_eq!(Money::from_cents(1_500).to_string(), "15.00");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }
}
