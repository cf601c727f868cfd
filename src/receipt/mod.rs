//! Receipt formatting module
//!
//! Peso formatting plus the table layout consumed by the receipt PDF.

#![allow(unused_imports)]

mod currency;
mod render;
mod table;

pub use currency::{format_ars, format_ars_decimal, FormatError, CURRENCY_CODE, LOCALE};
pub use render::{OutputFormat, ReceiptRenderer};
pub use table::{Receipt, ReceiptItem, ReceiptRow, ReceiptTable};
