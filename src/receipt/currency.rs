//! Argentine peso formatting
//!
//! Renders amounts the way es-AR currency formatting does for ARS with no
//! fractional digits: `$`, a non-breaking space, then the integer part
//! grouped in threes with `.`.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Locale used for receipt amounts
pub const LOCALE: &str = "es-AR";

/// ISO currency code used for receipt amounts
pub const CURRENCY_CODE: &str = "ARS";

const CURRENCY_SYMBOL: &str = "$";
const SYMBOL_SEPARATOR: char = '\u{a0}';
const GROUP_SEPARATOR: char = '.';

/// Currency formatting errors
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FormatError {
    #[error("Cannot format non-finite amount: {0}")]
    NonFinite(f64),
}

/// Format an amount as whole Argentine pesos.
///
/// Rounds half away from zero. Negative amounts keep a leading minus sign,
/// except when they round to zero, which is always rendered as `$ 0`.
pub fn format_ars(amount: f64) -> Result<String, FormatError> {
    if !amount.is_finite() {
        return Err(FormatError::NonFinite(amount));
    }

    let rounded = amount.abs().round();
    let negative = amount.is_sign_negative() && rounded != 0.0;

    Ok(compose(negative, &format!("{rounded:.0}")))
}

/// Format a decimal amount as whole Argentine pesos.
pub fn format_ars_decimal(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    compose(negative, &rounded.abs().trunc().normalize().to_string())
}

fn compose(negative: bool, digits: &str) -> String {
    let sign = if negative { "-" } else { "" };
    format!(
        "{sign}{CURRENCY_SYMBOL}{SYMBOL_SEPARATOR}{}",
        group_thousands(digits)
    )
}

/// Insert the es-AR group separator every three digits from the right.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(ch);
    }

    grouped
}
