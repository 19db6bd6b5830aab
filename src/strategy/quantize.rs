//! Price and quantity quantization against exchange filters
//!
//! Pure functions, no I/O. Every order the strategies submit passes through
//! [`normalize`] first, so nothing reaches the network with a price off the
//! tick grid or a quantity off the step grid.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::common::errors::ValidationError;
use crate::common::types::SymbolFilters;

/// Price and quantity after rounding and validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedOrderParams {
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

impl NormalizedOrderParams {
    /// price * quantity; `None` without a price or when the product overflows
    pub fn notional(&self) -> Option<Decimal> {
        self.price.and_then(|p| p.checked_mul(self.quantity))
    }
}

/// Round a quantity down to a multiple of `step`
///
/// `None` for a zero step or when the result does not fit a `Decimal`.
pub fn floor_to_step(quantity: Decimal, step: Decimal) -> Option<Decimal> {
    let steps = quantity.checked_div(step)?.floor();
    Some(steps.checked_mul(step)?.normalize())
}

/// Round a price to the nearest multiple of `tick`, halves rounding up
///
/// `None` for a zero tick or when the result does not fit a `Decimal`.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Option<Decimal> {
    let ticks = price
        .checked_div(tick)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Some(ticks.checked_mul(tick)?.normalize())
}

fn check_filters(filters: &SymbolFilters) -> Result<(), ValidationError> {
    if filters.tick_size <= Decimal::ZERO {
        return Err(ValidationError::InvalidFilters(format!(
            "{} tick size must be positive, got {}",
            filters.symbol, filters.tick_size
        )));
    }
    if filters.step_size <= Decimal::ZERO {
        return Err(ValidationError::InvalidFilters(format!(
            "{} step size must be positive, got {}",
            filters.symbol, filters.step_size
        )));
    }
    if filters.min_notional < Decimal::ZERO {
        return Err(ValidationError::InvalidFilters(format!(
            "{} minimum notional must not be negative, got {}",
            filters.symbol, filters.min_notional
        )));
    }
    Ok(())
}

/// Round a quantity to the step grid and check it against LOT_SIZE
pub fn normalize_quantity(
    quantity: Decimal,
    filters: &SymbolFilters,
) -> Result<Decimal, ValidationError> {
    check_filters(filters)?;

    let rounded = floor_to_step(quantity, filters.step_size).ok_or_else(|| {
        ValidationError::InvalidParameter(format!(
            "quantity {} overflows on step {}",
            quantity, filters.step_size
        ))
    })?;
    if rounded <= Decimal::ZERO {
        return Err(ValidationError::InvalidQuantity {
            requested: quantity,
            rounded,
            step_size: filters.step_size,
        });
    }

    let min = filters.min_qty.unwrap_or(Decimal::ZERO);
    let max = filters.max_qty.unwrap_or(Decimal::MAX);
    if rounded < min || rounded > max {
        return Err(ValidationError::QuantityOutOfRange {
            quantity: rounded,
            min,
            max,
        });
    }

    Ok(rounded)
}

/// Round a price to the tick grid and check it against PRICE_FILTER
pub fn normalize_price(price: Decimal, filters: &SymbolFilters) -> Result<Decimal, ValidationError> {
    check_filters(filters)?;

    let rounded = round_to_tick(price, filters.tick_size).ok_or_else(|| {
        ValidationError::InvalidParameter(format!(
            "price {} overflows on tick {}",
            price, filters.tick_size
        ))
    })?;
    if rounded <= Decimal::ZERO {
        return Err(ValidationError::InvalidPrice {
            requested: price,
            rounded,
            tick_size: filters.tick_size,
        });
    }

    let min = filters.min_price.unwrap_or(Decimal::ZERO);
    let max = filters.max_price.unwrap_or(Decimal::MAX);
    if rounded < min || rounded > max {
        return Err(ValidationError::PriceOutOfRange {
            price: rounded,
            min,
            max,
        });
    }

    Ok(rounded)
}

/// Round and validate a requested price/quantity pair
///
/// The minimum notional is only enforced when a price is supplied. Market
/// orders pass unchecked; re-check after the fill if the notional matters.
pub fn normalize(
    price: Option<Decimal>,
    quantity: Decimal,
    filters: &SymbolFilters,
) -> Result<NormalizedOrderParams, ValidationError> {
    let quantity = normalize_quantity(quantity, filters)?;
    let price = price.map(|p| normalize_price(p, filters)).transpose()?;

    let params = NormalizedOrderParams { price, quantity };
    if let Some(price) = price {
        let notional = price.checked_mul(quantity).ok_or_else(|| {
            ValidationError::InvalidParameter(format!(
                "notional of {} x {} overflows",
                quantity, price
            ))
        })?;
        if notional < filters.min_notional {
            return Err(ValidationError::NotionalTooSmall {
                notional,
                min_notional: filters.min_notional,
            });
        }
    }

    Ok(params)
}
