//! Receipt model and table layout
//!
//! Builds the rows the PDF table collaborator draws. Every money cell goes
//! through the peso formatter.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::currency::format_ars_decimal;

/// A sale as recorded by the kiosk
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    /// Receipt number shown in the header
    pub number: String,

    /// When the sale was made
    pub issued_at: DateTime<Local>,

    /// Customer name, if any
    #[serde(default)]
    pub customer: Option<String>,

    /// Sold items
    pub items: Vec<ReceiptItem>,

    /// Payment method (efectivo, tarjeta, transferencia...)
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// A single receipt line
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl ReceiptItem {
    #[cfg(test)]
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// Quantity times unit price, `None` if it does not fit a `Decimal`
    pub fn subtotal(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }

    fn checked_subtotal(&self) -> Result<Decimal> {
        self.subtotal().with_context(|| {
            format!(
                "Subtotal of {} x {} ({}) is out of range",
                self.quantity, self.unit_price, self.description
            )
        })
    }
}

#[cfg(test)]
impl Receipt {
    /// Create an empty receipt issued now
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            issued_at: Local::now(),
            customer: None,
            items: Vec::new(),
            payment_method: None,
        }
    }

    pub fn customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    pub fn payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn item(mut self, item: ReceiptItem) -> Self {
        self.items.push(item);
        self
    }
}

impl Receipt {
    /// Load a receipt from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read receipt: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse receipt: {}", path.display()))
    }

    /// Sum of all line subtotals
    pub fn total(&self) -> Result<Decimal> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            total
                .checked_add(item.checked_subtotal()?)
                .with_context(|| format!("Total of receipt {} is out of range", self.number))
        })
    }

    /// Lay the receipt out as table rows
    pub fn table(&self) -> Result<ReceiptTable> {
        let rows = self
            .items
            .iter()
            .map(|item| {
                Ok(ReceiptRow {
                    quantity: item.quantity.normalize().to_string(),
                    description: item.description.clone(),
                    unit_price: format_ars_decimal(item.unit_price),
                    subtotal: format_ars_decimal(item.checked_subtotal()?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ReceiptTable {
            title: format!("Comprobante N° {}", self.number),
            issued_at: self.issued_at.format("%d/%m/%Y %H:%M").to_string(),
            customer: self.customer.clone(),
            payment_method: self.payment_method.clone(),
            headers: ReceiptTable::HEADERS.map(String::from).to_vec(),
            rows,
            total: format_ars_decimal(self.total()?),
        })
    }
}

/// One formatted table row
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReceiptRow {
    pub quantity: String,
    pub description: String,
    pub unit_price: String,
    pub subtotal: String,
}

impl ReceiptRow {
    pub fn cells(&self) -> [&str; 4] {
        [
            self.quantity.as_str(),
            self.description.as_str(),
            self.unit_price.as_str(),
            self.subtotal.as_str(),
        ]
    }
}

/// Formatted receipt, ready for a table renderer
#[derive(Clone, Debug, Serialize)]
pub struct ReceiptTable {
    pub title: String,
    pub issued_at: String,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<ReceiptRow>,
    pub total: String,
}

impl ReceiptTable {
    pub const HEADERS: [&'static str; 4] = ["Cant.", "Descripción", "P. Unit.", "Subtotal"];
}
