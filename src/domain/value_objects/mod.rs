//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }

    /// Amount in the currency's minor unit (paise for INR), as payment
    /// gateways expect it.
    pub fn minor_units(&self) -> Result<i64, MoneyError> {
        self.amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.round().to_i64())
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Overflow => write!(f, "Amount overflow") }
    }
}

/// Quantity of a single cart or order line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub const MAX_PER_LINE: u32 = 10;

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > Self::MAX_PER_LINE { return Err(QuantityError::TooMany); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero, TooMany }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "Quantity must be at least 1"),
            Self::TooMany => write!(f, "Quantity cannot exceed {}", Quantity::MAX_PER_LINE),
        }
    }
}

/// Postal address used for shipping and saved on the customer profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[validate(length(max = 200))]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(custom = "validate_postal_code")]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
}

/// Accepts 10-15 digits with an optional leading `+`; spaces and dashes are ignored.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits: String = phone.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);
    if (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

/// Indian PIN codes are six digits and never start with zero.
pub fn validate_postal_code(code: &str) -> Result<(), ValidationError> {
    let valid = code.len() == 6
        && code.chars().all(|c| c.is_ascii_digit())
        && !code.starts_with('0');
    if valid { Ok(()) } else { Err(ValidationError::new("postal_code")) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            full_name: "Arjun Mehta".into(),
            phone: "+91 98765-43210".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            postal_code: "560001".into(),
            country: "IN".into(),
        }
    }

    #[test]
    fn test_money_minor_units() {
        assert_eq!(Money::new(Decimal::new(149999, 2), "inr").minor_units().unwrap(), 149_999);
        assert_eq!(Money::new(Decimal::new(99, 0), "INR").minor_units().unwrap(), 9_900);
        assert_eq!(Money::new(Decimal::MAX, "INR").minor_units(), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_money_display() {
        let price = Money::new(Decimal::new(1499, 0), "inr");
        assert_eq!(price.to_string(), "INR 1499.00");
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::new(11), Err(QuantityError::TooMany));
        assert_eq!(Quantity::new(Quantity::MAX_PER_LINE).unwrap().value(), 10);
    }

    #[test]
    fn test_address_validation() {
        assert!(address().validate().is_ok());

        let mut bad = address();
        bad.postal_code = "012345".into();
        assert!(bad.validate().is_err());

        let mut bad = address();
        bad.phone = "12ab".into();
        assert!(bad.validate().is_err());
    }
}
