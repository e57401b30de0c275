//! Receipt document model

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Restaurant identity printed in the receipt header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// One billed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Line total as computed by the caller
    pub total: Decimal,
}

/// How the bill was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Upi,
    Card,
}

impl PaymentMethod {
    /// Label printed on the payment row
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Card => "CARD",
        }
    }
}

/// One print job's bill content
///
/// Immutable once built; the encoder renders every field as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDocument {
    pub restaurant: RestaurantInfo,
    pub invoice_number: String,
    /// Order this bill belongs to, attached to queued jobs
    #[serde(default)]
    pub order_id: Option<String>,
    pub table_number: String,
    /// Local wall-clock time of the bill
    pub timestamp: NaiveDateTime,
    pub items: Vec<ReceiptLineItem>,
    pub subtotal: Decimal,
    /// Percentage, e.g. `5` for 5%
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    #[serde(default)]
    pub discount: Option<Decimal>,
    pub grand_total: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
}
