//! Deterministic dry-run exchange

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::common::errors::{ExchangeError, ExchangeResult};
use crate::common::traits::ExchangeClient;
use crate::common::types::{OrderHandle, OrderRequest, OrderStatus, OrderType, SymbolFilters};
use crate::config::SimulationConfig;

const FIRST_ORDER_ID: u64 = 100_001;

/// Same code Binance futures uses for a reused `newClientOrderId`
pub const DUPLICATE_CLIENT_ORDER_ID: i64 = -4116;

/// Failure injected for every submission at a given price
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedFault {
    /// Fails with a transient network error (retried, then surfaced)
    Transient,
    /// Rejected by the "exchange"
    Rejected { code: i64, message: String },
}

impl SimulatedFault {
    fn to_error(&self) -> ExchangeError {
        match self {
            SimulatedFault::Transient => {
                ExchangeError::Network("simulated connection reset".to_string())
            }
            SimulatedFault::Rejected { code, message } => ExchangeError::Rejected {
                code: *code,
                message: message.clone(),
            },
        }
    }
}

/// An accepted order and when it was accepted
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub request: OrderRequest,
    pub order_id: String,
    pub submitted_at: Instant,
}

#[derive(Debug)]
struct SimulatedOrder {
    handle: OrderHandle,
    polls: u32,
}

#[derive(Debug)]
struct SimulatedState {
    next_id: u64,
    orders: HashMap<String, SimulatedOrder>,
    submissions: Vec<SubmittedOrder>,
    faults: HashMap<Decimal, SimulatedFault>,
    /// client order id -> order id
    client_ids: HashMap<String, String>,
    /// Reference price fetches still to fail
    reference_faults: u32,
}

/// In-memory exchange that fills orders after a fixed number of polls
///
/// Safe to share between concurrent strategies; all state sits behind one
/// mutex that is never held across an await.
pub struct SimulatedExchange {
    config: SimulationConfig,
    state: Mutex<SimulatedState>,
}

impl SimulatedExchange {
    pub fn new(config: SimulationConfig) -> Self {
        info!(
            "Simulated exchange: LIMIT fills after {:?} polls, stops after {:?}",
            config.limit_fill_after_polls, config.stop_fill_after_polls
        );
        Self {
            config,
            state: Mutex::new(SimulatedState {
                next_id: FIRST_ORDER_ID,
                orders: HashMap::new(),
                submissions: Vec::new(),
                faults: HashMap::new(),
                client_ids: HashMap::new(),
                reference_faults: 0,
            }),
        }
    }

    /// Make every submission whose price (or stop price) equals `price` fail
    pub async fn inject_fault_at_price(&self, price: Decimal, fault: SimulatedFault) {
        self.state.lock().await.faults.insert(price.normalize(), fault);
    }

    /// Fail the next `count` reference price fetches with a transient error
    pub async fn fail_reference_price(&self, count: u32) {
        self.state.lock().await.reference_faults = count;
    }

    /// Fill a working order now, regardless of its poll count
    pub async fn fill(&self, order_id: &str) -> Option<OrderHandle> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(order_id)?;
        if !order.handle.status.is_final() {
            mark_filled(&mut order.handle);
        }
        Some(order.handle.clone())
    }

    /// Every accepted submission, in acceptance order
    pub async fn submitted_orders(&self) -> Vec<SubmittedOrder> {
        self.state.lock().await.submissions.clone()
    }

    /// Current state of an order without counting as a poll
    pub async fn order(&self, order_id: &str) -> Option<OrderHandle> {
        self.state
            .lock()
            .await
            .orders
            .get(order_id)
            .map(|order| order.handle.clone())
    }

    fn filters_for(&self, symbol: &str) -> ExchangeResult<&SymbolFilters> {
        self.config
            .symbols
            .iter()
            .find(|filters| filters.symbol == symbol)
            .ok_or_else(|| ExchangeError::NotFound(format!("unknown symbol {}", symbol)))
    }

    /// Polls after which an order of this type fills, if ever
    fn fill_after(&self, order_type: OrderType) -> Option<u32> {
        match order_type {
            OrderType::Market => Some(1),
            OrderType::Limit => self.config.limit_fill_after_polls,
            OrderType::StopMarket | OrderType::StopLimit => self.config.stop_fill_after_polls,
        }
    }
}

fn mark_filled(handle: &mut OrderHandle) {
    handle.status = OrderStatus::Filled;
    handle.executed_qty = handle.quantity;
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        self.filters_for(symbol).cloned()
    }

    async fn submit_order(&self, request: &OrderRequest) -> ExchangeResult<OrderHandle> {
        self.filters_for(&request.symbol)?;

        let mut state = self.state.lock().await;
        let fault = [request.price, request.stop_price]
            .into_iter()
            .flatten()
            .find_map(|price| state.faults.get(&price.normalize()).cloned());
        if let Some(fault) = fault {
            debug!("Injected fault for {:?}: {:?}", request, fault);
            return Err(fault.to_error());
        }

        if let Some(client_id) = &request.client_order_id {
            if state.client_ids.contains_key(client_id) {
                return Err(ExchangeError::Rejected {
                    code: DUPLICATE_CLIENT_ORDER_ID,
                    message: format!("client order id {} is duplicated", client_id),
                });
            }
        }

        let order_id = state.next_id.to_string();
        state.next_id += 1;
        if let Some(client_id) = &request.client_order_id {
            state.client_ids.insert(client_id.clone(), order_id.clone());
        }

        let mut handle = OrderHandle {
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            status: OrderStatus::New,
            executed_qty: Decimal::ZERO,
        };
        if request.order_type == OrderType::Market && self.config.market_fill_on_submit {
            mark_filled(&mut handle);
        }

        state.submissions.push(SubmittedOrder {
            request: request.clone(),
            order_id: order_id.clone(),
            submitted_at: Instant::now(),
        });
        state.orders.insert(
            order_id,
            SimulatedOrder {
                handle: handle.clone(),
                polls: 0,
            },
        );

        debug!("Simulated order accepted: {}", handle);
        Ok(handle)
    }

    async fn find_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<Option<OrderHandle>> {
        self.filters_for(symbol)?;
        let state = self.state.lock().await;
        Ok(state
            .client_ids
            .get(client_order_id)
            .and_then(|order_id| state.orders.get(order_id))
            .map(|order| order.handle.clone()))
    }

    async fn get_order_status(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&handle.order_id)
            .ok_or_else(|| ExchangeError::NotFound(format!("order {}", handle.order_id)))?;

        order.polls += 1;
        if !order.handle.status.is_final() {
            if let Some(after) = self.fill_after(order.handle.order_type) {
                if order.polls >= after {
                    mark_filled(&mut order.handle);
                    debug!("Simulated fill: {}", order.handle);
                }
            }
        }

        Ok(order.handle.clone())
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&handle.order_id)
            .ok_or_else(|| ExchangeError::NotFound(format!("order {}", handle.order_id)))?;

        if order.handle.status.is_final() {
            return Err(ExchangeError::AlreadyResolved(format!(
                "order {} is {}",
                handle.order_id, order.handle.status
            )));
        }

        order.handle.status = OrderStatus::Canceled;
        Ok(order.handle.clone())
    }

    async fn get_balances(&self) -> ExchangeResult<BTreeMap<String, Decimal>> {
        Ok(self.config.balances.clone())
    }

    async fn get_reference_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.filters_for(symbol)?;
        let mut state = self.state.lock().await;
        if state.reference_faults > 0 {
            state.reference_faults -= 1;
            return Err(ExchangeError::RateLimited {
                retry_after_ms: None,
            });
        }
        Ok(self.config.reference_price)
    }
}
