//! Money conversion helper.
//!
//! Transaction-currency amounts are mirrored into the company's base
//! currency using a per-document exchange rate. All mirrors are computed
//! through [`to_base`] so the rounding is identical in both directions:
//! reversing a payment adds back exactly the converted amount that
//! applying it subtracted.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal scale of base-currency mirrors.
pub const BASE_SCALE: u32 = 2;

/// Convert a transaction-currency amount into the base currency.
///
/// Rounds half-even at [`BASE_SCALE`] decimal places.
pub fn to_base(amount: Decimal, rate: Decimal) -> Decimal {
    (amount * rate).round_dp_with_strategy(BASE_SCALE, RoundingStrategy::MidpointNearestEven)
}
