//! Amount type
//!
//! Domain primitive for monetary amounts with business rule validation.
//! All amounts are validated and rounded to two decimal places at construction
//! time, so every credit and debit applies the same rounding rule.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Monetary scale used by both account stores
pub const MONEY_SCALE: u32 = 2;

/// Maximum allowed amount for a single operation
const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Round a decimal to the monetary scale (half away from zero).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0) after rounding
/// - Exactly two decimal places
/// - Maximum value is one billion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use account_gateway::domain::Amount;
///
/// let amount: Amount = "50.75".parse().unwrap();
/// assert_eq!(amount.value(), Decimal::new(5075, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),

    #[error("Amount is required")]
    Missing,
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if the rounded value is <= 0
    /// - `AmountError::Overflow` if the value exceeds the maximum
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        let rounded = round_money(value);

        if rounded <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        if rounded > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(rounded))
    }

    /// Parse an amount from a JSON value.
    ///
    /// Accepts JSON numbers and numeric strings. Anything else (null, booleans,
    /// objects, non-numeric strings) is rejected.
    pub fn from_json(value: &Value) -> Result<Self, AmountError> {
        match value {
            Value::Number(number) => number.to_string().parse(),
            Value::String(text) => text.trim().parse(),
            Value::Null => Err(AmountError::Missing),
            other => Err(AmountError::ParseError(other.to_string())),
        }
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmountError::Missing);
        }
        // Decimal::from_scientific covers inputs like "1e2" that JSON numbers may carry
        let decimal = Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map_err(|e| AmountError::ParseError(format!("'{}': {}", s, e)))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

/// Balance represents an account balance (can be zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive), rounded to the monetary scale
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        let rounded = round_money(value);
        if rounded < Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(rounded))
    }

    /// Wrap a stored balance without the sign check; debits still refuse to go below zero
    pub fn from_stored(value: Decimal) -> Self {
        Self(round_money(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if balance is sufficient for withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Balance {
        Self(round_money(self.0 + amount.value()))
    }

    /// Subtract amount from balance; fails if the result would be negative
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100));
        assert_eq!(amount.unwrap().value(), dec!(100.00));
    }

    #[test]
    fn test_amount_zero_rejected() {
        assert!(matches!(Amount::new(Decimal::ZERO), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        assert!(matches!(Amount::new(dec!(-5)), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_rounds_to_two_decimals() {
        let amount = Amount::new(dec!(10.005)).unwrap();
        assert_eq!(amount.value(), dec!(10.01));
        assert_eq!(amount.to_string(), "10.01");
    }

    #[test]
    fn test_amount_rounding_to_zero_rejected() {
        assert!(matches!(Amount::new(dec!(0.004)), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_overflow() {
        assert!(matches!(Amount::new(dec!(1000000000.01)), Err(AmountError::Overflow)));
    }

    #[test]
    fn test_amount_from_json() {
        assert_eq!(Amount::from_json(&json!(50.75)).unwrap().value(), dec!(50.75));
        assert_eq!(Amount::from_json(&json!("20")).unwrap().value(), dec!(20));
        assert_eq!(Amount::from_json(&json!(1e2)).unwrap().value(), dec!(100));
        assert_eq!(Amount::from_json(&Value::Null), Err(AmountError::Missing));
        assert!(matches!(Amount::from_json(&json!("abc")), Err(AmountError::ParseError(_))));
        assert!(matches!(Amount::from_json(&json!(true)), Err(AmountError::ParseError(_))));
        assert!(matches!(Amount::from_json(&json!("NaN")), Err(AmountError::ParseError(_))));
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::new(dec!(100.00)).unwrap();
        let amount = Amount::new(dec!(50.75)).unwrap();

        let balance = balance.credit(&amount);
        assert_eq!(balance.to_string(), "150.75");

        let balance = balance.debit(&amount).unwrap();
        assert_eq!(balance.value(), dec!(100.00));
    }

    #[test]
    fn test_balance_insufficient() {
        let balance = Balance::new(dec!(50)).unwrap();
        let amount = Amount::new(dec!(75)).unwrap();

        assert!(!balance.is_sufficient_for(&amount));
        assert!(matches!(balance.debit(&amount), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_stored_negative_balance_cannot_be_debited() {
        let balance = Balance::from_stored(dec!(-10.005));
        let amount = Amount::new(dec!(1)).unwrap();

        assert_eq!(balance.value(), dec!(-10.01));
        assert!(!balance.is_sufficient_for(&amount));
        assert!(balance.debit(&amount).is_err());
        assert_eq!(balance.credit(&amount).value(), dec!(-9.01));
    }
}
