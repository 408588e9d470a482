//! Numeric quantization against exchange filters.
//!
//! Quantities round **down** (never commit more margin than asked), prices
//! round **half-up** to the nearest tick. Output strings are plain decimal
//! notation without trailing zeros.

use perp_core::SymbolFilters;
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounding direction for [`quantize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    HalfUp,
    Up,
}

impl Rounding {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Self::Down => RoundingStrategy::ToZero,
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::Up => RoundingStrategy::AwayFromZero,
        }
    }
}

/// Snap `value` to a multiple of `step` (ignored when non-positive), then to
/// `precision` decimal places, using the same rounding for both.
pub fn quantize(value: Decimal, step: Decimal, precision: Option<u32>, rounding: Rounding) -> Decimal {
    let strategy = rounding.strategy();
    let mut out = value;
    if step > Decimal::ZERO {
        out = (out / step).round_dp_with_strategy(0, strategy) * step;
    }
    if let Some(dp) = precision {
        out = out.round_dp_with_strategy(dp, strategy);
    }
    out.normalize()
}

/// Smallest multiple of `step` that is ≥ `value`.
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    quantize(value, step, None, Rounding::Up)
}

/// Largest multiple of `step` that is ≤ `value`.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    quantize(value, step, None, Rounding::Down)
}

/// Nearest multiple of `step`, halves rounded up.
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    quantize(value, step, None, Rounding::HalfUp)
}

/// Quantity as transmitted: step size and quantity precision, rounded down.
pub fn format_quantity(quantity: Decimal, filters: &SymbolFilters) -> String {
    quantize(
        quantity,
        filters.step_size,
        Some(filters.quantity_precision),
        Rounding::Down,
    )
    .to_string()
}

/// Price as transmitted: tick size and price precision, rounded half-up.
pub fn format_price(price: Decimal, filters: &SymbolFilters) -> String {
    quantize(
        price,
        filters.tick_size,
        Some(filters.price_precision),
        Rounding::HalfUp,
    )
    .to_string()
}
