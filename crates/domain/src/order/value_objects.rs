//! Value objects for the order domain.

use chrono::NaiveDate;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Human-readable order number, `ORD{YYMMDD}-{NNNN}`.
///
/// The sequence is scoped to the calendar day and widens past four digits
/// instead of wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Formats the `sequence`-th order number of `day`.
    pub fn for_day(day: NaiveDate, sequence: u32) -> Self {
        Self(format!("ORD{}-{sequence:04}", day.format("%y%m%d")))
    }

    /// Wraps a number read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shipping address, frozen into the order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trims every field and rejects blanks.
    pub fn normalized(&self) -> Result<Self, DomainError> {
        let field = |name: &'static str, value: &str| -> Result<String, DomainError> {
            let value = value.trim();
            if value.is_empty() {
                Err(DomainError::validation(name, "must not be empty"))
            } else {
                Ok(value.to_string())
            }
        };
        Ok(Self {
            street: field("street", &self.street)?,
            city: field("city", &self.city)?,
            state: field("state", &self.state)?,
            postal_code: field("postal_code", &self.postal_code)?,
            country: field("country", &self.country)?,
        })
    }
}

/// How the customer intends to pay. Recorded only; never processed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::Paypal,
        PaymentMethod::BankTransfer,
        PaymentMethod::CashOnDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::Paypal => "PAYPAL",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation("payment_method", format!("unknown payment method '{s}'"))
            })
    }
}

/// An item in an order: a snapshot of the product at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name when the order was placed.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Unit price charged (sale price if one was active).
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this item (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
