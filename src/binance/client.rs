//! Live Binance futures adapter

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::messages::{OrderResponse, SymbolFilter, SymbolInfo};
use super::rest::BinanceRestClient;
use crate::common::errors::{ExchangeError, ExchangeResult};
use crate::common::traits::ExchangeClient;
use crate::common::types::{OrderHandle, OrderRequest, OrderStatus, OrderType, Side, SymbolFilters};
use crate::config::types::BinanceConfig;

/// Order does not exist, or is no longer open
const UNKNOWN_ORDER: i64 = -2011;

/// `newClientOrderId` already used by an earlier order
const DUPLICATE_CLIENT_ORDER_ID: i64 = -4116;

/// [`ExchangeClient`] backed by the Binance USDⓈ-M futures REST API
pub struct BinanceClient {
    rest: BinanceRestClient,
}

impl BinanceClient {
    /// Create a new client from configuration
    pub fn new(config: &BinanceConfig, timeout: Duration) -> ExchangeResult<Self> {
        let mut rest = BinanceRestClient::with_timeout(config.rest_base_url(), timeout)?
            .with_recv_window(config.recv_window_ms);
        if let Some(credentials) = config.credentials() {
            rest = rest.with_credentials(credentials);
        }
        info!("Binance futures client for {}", rest.base_url());
        Ok(Self { rest })
    }

    pub fn from_rest(rest: BinanceRestClient) -> Self {
        Self { rest }
    }

    /// Get a reference to the REST client
    pub fn rest(&self) -> &BinanceRestClient {
        &self.rest
    }
}

/// Wire parameters for a new order
pub fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
    let wire_type = match request.order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopMarket => "STOP_MARKET",
        // Futures stop-limit is STOP with a limit price
        OrderType::StopLimit => "STOP",
    };

    let mut params = vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_str().to_string()),
        ("type", wire_type.to_string()),
        ("quantity", request.quantity.normalize().to_string()),
    ];
    if let Some(price) = request.price {
        params.push(("price", price.normalize().to_string()));
    }
    if let Some(stop_price) = request.stop_price {
        params.push(("stopPrice", stop_price.normalize().to_string()));
    }
    if let Some(time_in_force) = request.time_in_force {
        if request.price.is_some() {
            params.push(("timeInForce", time_in_force.as_str().to_string()));
        }
    }
    if request.order_type.is_stop() {
        params.push(("workingType", "MARK_PRICE".to_string()));
    }
    if request.reduce_only {
        params.push(("reduceOnly", "true".to_string()));
    }
    if let Some(client_order_id) = &request.client_order_id {
        params.push(("newClientOrderId", client_order_id.clone()));
    }
    params
}

/// Pull PRICE_FILTER, LOT_SIZE and MIN_NOTIONAL out of a symbol entry
pub fn parse_filters(info: &SymbolInfo) -> ExchangeResult<SymbolFilters> {
    let mut tick = None;
    let mut step = None;
    let mut min_notional = Decimal::ZERO;
    let mut price_bounds = None;
    let mut qty_bounds = None;

    for filter in &info.filters {
        match filter {
            SymbolFilter::PriceFilter {
                min_price,
                max_price,
                tick_size,
            } => {
                tick = Some(*tick_size);
                price_bounds = Some((*min_price, *max_price));
            }
            SymbolFilter::LotSize {
                min_qty,
                max_qty,
                step_size,
            } => {
                step = Some(*step_size);
                qty_bounds = Some((*min_qty, *max_qty));
            }
            SymbolFilter::MinNotional { notional } => min_notional = *notional,
            SymbolFilter::Other => {}
        }
    }

    let (Some(tick), Some(step)) = (tick, step) else {
        return Err(ExchangeError::InvalidResponse(format!(
            "{} is missing PRICE_FILTER or LOT_SIZE",
            info.symbol
        )));
    };

    let mut filters = SymbolFilters::new(&info.symbol, tick, step, min_notional);
    // Binance uses 0 for "no bound"
    if let Some((min, max)) = qty_bounds {
        filters.min_qty = (min > Decimal::ZERO).then_some(min);
        filters.max_qty = (max > Decimal::ZERO).then_some(max);
    }
    if let Some((min, max)) = price_bounds {
        filters.min_price = (min > Decimal::ZERO).then_some(min);
        filters.max_price = (max > Decimal::ZERO).then_some(max);
    }
    Ok(filters)
}

/// Convert a wire order into a handle
pub fn to_handle(order: &OrderResponse) -> ExchangeResult<OrderHandle> {
    let side = order
        .side
        .parse::<Side>()
        .map_err(ExchangeError::InvalidResponse)?;
    let wire_type = order.orig_type.as_deref().unwrap_or(&order.order_type);
    let order_type = match wire_type {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        "STOP_MARKET" | "TAKE_PROFIT_MARKET" => OrderType::StopMarket,
        "STOP" | "TAKE_PROFIT" => OrderType::StopLimit,
        other => {
            return Err(ExchangeError::InvalidResponse(format!(
                "unsupported order type {}",
                other
            )))
        }
    };

    // Zero means "not set" on the wire
    let non_zero = |value: Option<Decimal>| value.filter(|v| !v.is_zero());

    Ok(OrderHandle {
        order_id: order.order_id.to_string(),
        symbol: order.symbol.clone(),
        side,
        order_type,
        quantity: order.orig_qty,
        price: non_zero(order.price),
        stop_price: non_zero(order.stop_price),
        status: OrderStatus::from_exchange(&order.status),
        executed_qty: order.executed_qty,
    })
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &'static str {
        "binance-futures"
    }

    #[instrument(skip(self))]
    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        let exchange_info = self.rest.get_exchange_info().await?;
        let info = exchange_info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::NotFound(format!("unknown symbol {}", symbol)))?;
        parse_filters(info)
    }

    #[instrument(skip(self), fields(symbol = %request.symbol))]
    async fn submit_order(&self, request: &OrderRequest) -> ExchangeResult<OrderHandle> {
        let params = order_params(request);
        match self.rest.new_order(&params).await {
            Ok(order) => to_handle(&order),
            // An earlier attempt with this id was accepted; return that order
            Err(ExchangeError::Rejected { code, message }) if code == DUPLICATE_CLIENT_ORDER_ID => {
                let client_order_id = request.client_order_id.as_deref().unwrap_or_default();
                match self.find_order(&request.symbol, client_order_id).await? {
                    Some(existing) => {
                        warn!("Order {} was already placed as #{}", client_order_id, existing.order_id);
                        Ok(existing)
                    }
                    None => Err(ExchangeError::Rejected { code, message }),
                }
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self))]
    async fn find_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<Option<OrderHandle>> {
        match self.rest.query_order_by_client_id(symbol, client_order_id).await {
            Ok(order) => to_handle(&order).map(Some),
            Err(ExchangeError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self), fields(order_id = %handle.order_id))]
    async fn get_order_status(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle> {
        let order = self.rest.query_order(&handle.symbol, &handle.order_id).await?;
        to_handle(&order)
    }

    #[instrument(skip(self), fields(order_id = %handle.order_id))]
    async fn cancel_order(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle> {
        match self.rest.cancel_order(&handle.symbol, &handle.order_id).await {
            Ok(order) => to_handle(&order),
            Err(ExchangeError::Rejected { code, message }) if code == UNKNOWN_ORDER => {
                Err(ExchangeError::AlreadyResolved(message))
            }
            Err(err) => Err(err),
        }
    }

    async fn get_balances(&self) -> ExchangeResult<BTreeMap<String, Decimal>> {
        self.rest.get_available_balances().await
    }

    async fn get_reference_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        Ok(self.rest.get_premium_index(symbol).await?.mark_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::TimeInForce;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stop_limit_goes_out_as_stop_on_mark_price() {
        let request =
            OrderRequest::stop_limit("BTCUSDT", Side::Sell, dec!(0.010), dec!(59000.0), dec!(59500));
        let params = order_params(&request);
        assert_eq!(
            params,
            vec![
                ("symbol", "BTCUSDT".to_string()),
                ("side", "SELL".to_string()),
                ("type", "STOP".to_string()),
                ("quantity", "0.01".to_string()),
                ("price", "59000".to_string()),
                ("stopPrice", "59500".to_string()),
                ("timeInForce", "GTC".to_string()),
                ("workingType", "MARK_PRICE".to_string()),
            ]
        );
    }

    #[test]
    fn test_reduce_only_bracket_params() {
        let request = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(48000))
            .reduce_only();
        let params = order_params(&request);
        assert!(params.contains(&("type", "STOP_MARKET".to_string())));
        assert!(params.contains(&("reduceOnly", "true".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "timeInForce"));
    }

    #[test]
    fn test_market_has_no_time_in_force() {
        let request = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.01))
            .with_time_in_force(TimeInForce::Ioc);
        let params = order_params(&request);
        assert!(!params.iter().any(|(k, _)| *k == "timeInForce"));
        assert!(!params.iter().any(|(k, _)| *k == "newClientOrderId"));
    }

    #[test]
    fn test_client_order_id_is_sent() {
        let request = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.01))
            .with_client_order_id("to-abc");
        let params = order_params(&request);
        assert_eq!(
            params.last(),
            Some(&("newClientOrderId", "to-abc".to_string()))
        );
    }

    #[test]
    fn test_to_handle_maps_zero_prices_to_none() {
        let order = OrderResponse {
            order_id: 42,
            symbol: "BTCUSDT".into(),
            status: "FILLED".into(),
            side: "BUY".into(),
            order_type: "MARKET".into(),
            orig_type: Some("MARKET".into()),
            orig_qty: dec!(0.01),
            executed_qty: dec!(0.01),
            price: Some(dec!(0)),
            stop_price: Some(dec!(0)),
            avg_price: Some(dec!(50000)),
            time_in_force: Some("GTC".into()),
            reduce_only: false,
            update_time: None,
        };
        let handle = to_handle(&order).unwrap();
        assert_eq!(handle.order_id, "42");
        assert_eq!(handle.price, None);
        assert_eq!(handle.stop_price, None);
        assert!(handle.is_filled());
    }

    #[test]
    fn test_missing_filters_is_invalid_response() {
        let info = SymbolInfo {
            symbol: "BTCUSDT".into(),
            status: None,
            filters: vec![SymbolFilter::MinNotional { notional: dec!(5) }],
        };
        assert!(matches!(
            parse_filters(&info),
            Err(ExchangeError::InvalidResponse(_))
        ));
    }
}
