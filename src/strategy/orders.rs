//! Simple orders: market, limit and stop-limit
//!
//! Every order is normalized against the symbol's filters before it is sent.

use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::common::errors::Result;
use crate::common::types::{OrderHandle, OrderRequest, Side, TimeInForce};
use crate::strategy::quantize::normalize;
use crate::strategy::types::StrategyContext;

/// Places single, unlinked orders
#[derive(Debug, Clone)]
pub struct OrderPlacer {
    ctx: StrategyContext,
}

impl OrderPlacer {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderHandle> {
        let filters = self.ctx.filters(symbol).await?;
        let params = normalize(None, quantity, &filters)?;

        let request = OrderRequest::market(symbol, side, params.quantity);
        let handle = self.ctx.submit(&request).await?;
        info!("Market order accepted: {}", handle);
        Ok(handle)
    }

    #[instrument(skip(self))]
    pub async fn place_limit(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        time_in_force: TimeInForce,
    ) -> Result<OrderHandle> {
        let filters = self.ctx.filters(symbol).await?;
        let params = normalize(Some(price), quantity, &filters)?;
        let price = params.price.unwrap_or(price);

        let request = OrderRequest::limit(symbol, side, params.quantity, price)
            .with_time_in_force(time_in_force);
        let handle = self.ctx.submit(&request).await?;
        info!("Limit order accepted: {}", handle);
        Ok(handle)
    }

    /// Limit order that rests until `stop_price` is touched
    #[instrument(skip(self))]
    pub async fn place_stop_limit(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        stop_price: Decimal,
    ) -> Result<OrderHandle> {
        let filters = self.ctx.filters(symbol).await?;
        let params = normalize(Some(price), quantity, &filters)?;
        let price = params.price.unwrap_or(price);
        let stop_price = crate::strategy::quantize::normalize_price(stop_price, &filters)?;

        let request = OrderRequest::stop_limit(symbol, side, params.quantity, price, stop_price);
        let handle = self.ctx.submit(&request).await?;
        info!("Stop-limit order accepted: {}", handle);
        Ok(handle)
    }
}
