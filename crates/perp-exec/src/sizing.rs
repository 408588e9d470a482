//! Order Sizing & Validation.
//!
//! Pure functions: USD notional → exchange-compliant quantity, the leverage
//! needed to carry it, and a final filter check before submission.

use perp_core::{PerpError, Result, SymbolFilters};
use perp_td::precision::{Rounding, ceil_to_step, quantize};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

/// A quantity that satisfies step size, minimum quantity and minimum notional.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizedOrder {
    pub quantity: Decimal,
    /// `quantity × price`.
    pub notional: Decimal,
    /// The requested notional was below an exchange minimum and was raised.
    pub raised_to_minimum: bool,
}

/// Convert `notional_usd` at `price` into an order quantity.
///
/// The raw quantity is raised to `max(raw, min_qty, min_notional / price)` and
/// then rounded **up** to the step size, so rounding can never push the order
/// back under a minimum.
pub fn size_order(notional_usd: Decimal, price: Decimal, filters: &SymbolFilters) -> Result<SizedOrder> {
    if price <= Decimal::ZERO {
        return Err(PerpError::validation(format!(
            "cannot size {}: price {price} is not positive",
            filters.symbol
        )));
    }
    if notional_usd <= Decimal::ZERO {
        return Err(PerpError::validation(format!(
            "position size must be positive, got {notional_usd}"
        )));
    }

    let raw = notional_usd / price;
    let floor = filters.min_qty.max(filters.min_notional / price);
    let target = raw.max(floor);
    let quantity = ceil_to_step(target, filters.step_size);

    Ok(SizedOrder {
        quantity,
        notional: quantity * price,
        raised_to_minimum: target > raw,
    })
}

/// Leverage chosen for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeverageDecision {
    pub leverage: u32,
    /// The caller's leverage when it had to be raised to fit available margin.
    pub escalated_from: Option<u32>,
}

/// Pick the leverage for `notional` given `available` margin.
///
/// The requested leverage is kept when `notional / requested ≤ available`.
/// Otherwise the minimum workable leverage is `ceil(notional / available)`:
/// above `max_leverage` that is an insufficient-balance failure; below it the
/// leverage is raised, or refused when escalation is disabled.
pub fn resolve_leverage(
    notional: Decimal,
    available: Decimal,
    requested: u32,
    max_leverage: u32,
    allow_escalation: bool,
) -> Result<LeverageDecision> {
    if available <= Decimal::ZERO {
        return Err(PerpError::validation(format!(
            "no available balance (available={available})"
        )));
    }
    if requested == 0 || requested > max_leverage {
        return Err(PerpError::validation(format!(
            "leverage {requested} outside 1..={max_leverage}"
        )));
    }

    let required_margin = notional / Decimal::from(requested);
    if required_margin <= available {
        return Ok(LeverageDecision {
            leverage: requested,
            escalated_from: None,
        });
    }

    let min_leverage = (notional / available).ceil().to_u32().unwrap_or(u32::MAX);
    if min_leverage > max_leverage {
        return Err(PerpError::InsufficientBalance {
            required_notional: notional,
            available,
            min_leverage,
        });
    }
    if !allow_escalation {
        return Err(PerpError::validation(format!(
            "required margin {required_margin} exceeds available {available} at {requested}x; \
             {min_leverage}x needed"
        )));
    }
    Ok(LeverageDecision {
        leverage: min_leverage,
        escalated_from: Some(requested),
    })
}

/// Outcome of checking an order against a symbol's filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub adjusted_price: Decimal,
    pub adjusted_quantity: Decimal,
    pub notional: Decimal,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(PerpError::Validation {
                reasons: self.errors,
            })
        }
    }
}

/// Quantize `price`/`quantity` the way the client will transmit them and list
/// every filter the result violates.
pub fn validate_order_params(
    price: Decimal,
    quantity: Decimal,
    filters: &SymbolFilters,
) -> ValidationReport {
    let adjusted_price = quantize(
        price,
        filters.tick_size,
        Some(filters.price_precision),
        Rounding::HalfUp,
    );
    let adjusted_quantity = quantize(
        quantity,
        filters.step_size,
        Some(filters.quantity_precision),
        Rounding::Down,
    );
    let notional = adjusted_price * adjusted_quantity;

    let mut errors = Vec::new();
    if adjusted_price <= Decimal::ZERO {
        errors.push(format!("price {adjusted_price} must be positive"));
    }
    if adjusted_price < filters.min_price {
        errors.push(format!(
            "price {adjusted_price} below minimum {}",
            filters.min_price
        ));
    }
    if filters.max_price > Decimal::ZERO && adjusted_price > filters.max_price {
        errors.push(format!(
            "price {adjusted_price} above maximum {}",
            filters.max_price
        ));
    }
    if adjusted_quantity < filters.min_qty || adjusted_quantity <= Decimal::ZERO {
        errors.push(format!(
            "quantity {adjusted_quantity} below minimum {}",
            filters.min_qty
        ));
    }
    if filters.max_qty > Decimal::ZERO && adjusted_quantity > filters.max_qty {
        errors.push(format!(
            "quantity {adjusted_quantity} above maximum {}",
            filters.max_qty
        ));
    }
    if notional < filters.min_notional {
        errors.push(format!(
            "notional {notional} below minimum {}",
            filters.min_notional
        ));
    }

    ValidationReport {
        valid: errors.is_empty(),
        adjusted_price,
        adjusted_quantity,
        notional,
        errors,
    }
}

/// Risk-based position size in USD.
///
/// `min(available × leverage, available × risk_pct / price_risk)` where
/// `price_risk = |entry − stop| / entry`. A zero price risk yields zero.
pub fn calculate_position_size(
    available: Decimal,
    leverage: u32,
    risk_pct: Decimal,
    entry_price: Decimal,
    stop_loss: Decimal,
) -> Decimal {
    let max_by_leverage = available * Decimal::from(leverage);
    if entry_price.is_zero() {
        return Decimal::ZERO;
    }
    let price_risk = (entry_price - stop_loss).abs() / entry_price;
    let by_risk = if price_risk.is_zero() {
        Decimal::ZERO
    } else {
        available * risk_pct / price_risk
    };
    max_by_leverage.min(by_risk)
}
