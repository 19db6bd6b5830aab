//! Binance USDⓈ-M futures wire types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Error payload returned with non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// GET /fapi/v1/exchangeInfo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Entries of `symbols[].filters`; only the ones used for rounding are typed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFilter {
    #[serde(rename_all = "camelCase")]
    PriceFilter {
        min_price: Decimal,
        max_price: Decimal,
        tick_size: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    LotSize {
        min_qty: Decimal,
        max_qty: Decimal,
        step_size: Decimal,
    },
    MinNotional {
        notional: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Order as returned by POST, GET and DELETE /fapi/v1/order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub orig_type: Option<String>,
    pub orig_qty: Decimal,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: Option<String>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub update_time: Option<i64>,
}

/// Entry of GET /fapi/v2/balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub asset: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

/// GET /fapi/v1/premiumIndex?symbol=...
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndexResponse {
    pub symbol: String,
    pub mark_price: Decimal,
    #[serde(default)]
    pub index_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exchange_info_filters_parse() {
        let json = r#"{
            "timezone": "UTC",
            "symbols": [{
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "556.80", "maxPrice": "4529764", "tickSize": "0.10"},
                    {"filterType": "LOT_SIZE", "stepSize": "0.001", "maxQty": "1000", "minQty": "0.001"},
                    {"filterType": "MARKET_LOT_SIZE", "stepSize": "0.001", "maxQty": "120", "minQty": "0.001"},
                    {"filterType": "MIN_NOTIONAL", "notional": "100"}
                ]
            }]
        }"#;

        let info: ExchangeInfoResponse = serde_json::from_str(json).unwrap();
        let filters = &info.symbols[0].filters;
        assert_eq!(filters.len(), 4);
        assert!(matches!(
            filters[0],
            SymbolFilter::PriceFilter { tick_size, .. } if tick_size == dec!(0.10)
        ));
        assert!(matches!(filters[2], SymbolFilter::Other));
        assert!(matches!(
            filters[3],
            SymbolFilter::MinNotional { notional } if notional == dec!(100)
        ));
    }

    #[test]
    fn test_order_response_parse() {
        let json = r#"{
            "clientOrderId": "testOrder",
            "cumQty": "0",
            "cumQuote": "0",
            "executedQty": "0",
            "orderId": 22542179,
            "avgPrice": "0.00000",
            "origQty": "10",
            "price": "0",
            "reduceOnly": true,
            "side": "SELL",
            "status": "NEW",
            "stopPrice": "9300",
            "symbol": "BTCUSDT",
            "timeInForce": "GTC",
            "type": "STOP_MARKET",
            "origType": "STOP_MARKET",
            "updateTime": 1566818724722,
            "workingType": "CONTRACT_PRICE"
        }"#;

        let order: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, 22542179);
        assert_eq!(order.stop_price, Some(dec!(9300)));
        assert_eq!(order.orig_qty, dec!(10));
        assert!(order.reduce_only);
    }

    #[test]
    fn test_error_payload_parse() {
        let err: ApiErrorResponse =
            serde_json::from_str(r#"{"code": -2011, "msg": "Unknown order sent."}"#).unwrap();
        assert_eq!(err.code, -2011);
    }
}
