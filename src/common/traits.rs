//! Exchange capability set consumed by the strategies

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::ExchangeResult;
use super::types::{OrderHandle, OrderRequest, SymbolFilters};

/// Trait for exchange adapters (live Binance, simulated dry-run, etc.)
///
/// Strategies depend only on this trait. Implementations must tolerate
/// concurrent calls from independent strategies sharing one instance.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Fetch quantization rules for a symbol
    ///
    /// Fails with `ExchangeError::NotFound` for unknown symbols.
    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters>;

    /// Submit a new order
    async fn submit_order(&self, request: &OrderRequest) -> ExchangeResult<OrderHandle>;

    /// Look an order up by the client order id it was submitted with
    ///
    /// `Ok(None)` means the exchange has no such order, so resubmitting
    /// cannot create a duplicate.
    async fn find_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<Option<OrderHandle>>;

    /// Re-query an order and return the refreshed handle
    async fn get_order_status(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle>;

    /// Cancel a working order
    ///
    /// Fails with `ExchangeError::AlreadyResolved` if the order already
    /// filled or was canceled.
    async fn cancel_order(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle>;

    /// Available amount per asset
    async fn get_balances(&self) -> ExchangeResult<BTreeMap<String, Decimal>>;

    /// Current reference (mark) price for a symbol
    async fn get_reference_price(&self, symbol: &str) -> ExchangeResult<Decimal>;
}

/// Shared adapter handle for dynamic dispatch
pub type SharedExchange = Arc<dyn ExchangeClient>;
