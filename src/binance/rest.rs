//! Raw REST calls against Binance USDⓈ-M futures

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, instrument};

use super::auth::{signed_query, timestamp_ms};
use super::messages::*;
use crate::common::errors::{ExchangeError, ExchangeResult};
use crate::config::types::ApiCredentials;

pub const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";
pub const ORDER_PATH: &str = "/fapi/v1/order";
pub const BALANCE_PATH: &str = "/fapi/v2/balance";
pub const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";

/// REST client for Binance futures
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Needed for every signed endpoint
    credentials: Option<ApiCredentials>,
    recv_window_ms: u64,
}

impl BinanceRestClient {
    /// Create a new REST client (unauthenticated)
    pub fn new(base_url: &str) -> ExchangeResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            recv_window_ms: 5000,
        })
    }

    /// Set API credentials for signed requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Public Endpoints (No Authentication Required)
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn get_exchange_info(&self) -> ExchangeResult<ExchangeInfoResponse> {
        self.public_get(EXCHANGE_INFO_PATH, &[]).await
    }

    #[instrument(skip(self))]
    pub async fn get_premium_index(&self, symbol: &str) -> ExchangeResult<PremiumIndexResponse> {
        self.public_get(PREMIUM_INDEX_PATH, &[("symbol", symbol.to_string())])
            .await
    }

    // ========================================================================
    // Signed Endpoints
    // ========================================================================

    #[instrument(skip(self, params))]
    pub async fn new_order(&self, params: &[(&str, String)]) -> ExchangeResult<OrderResponse> {
        self.signed(Method::POST, ORDER_PATH, params).await
    }

    #[instrument(skip(self))]
    pub async fn query_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        self.signed(Method::GET, ORDER_PATH, &params).await
    }

    #[instrument(skip(self))]
    pub async fn query_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<OrderResponse> {
        let params = [
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        self.signed(Method::GET, ORDER_PATH, &params).await
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        self.signed(Method::DELETE, ORDER_PATH, &params).await
    }

    #[instrument(skip(self))]
    pub async fn get_balances(&self) -> ExchangeResult<Vec<BalanceEntry>> {
        self.signed(Method::GET, BALANCE_PATH, &[]).await
    }

    /// Available balance per asset
    pub async fn get_available_balances(&self) -> ExchangeResult<BTreeMap<String, rust_decimal::Decimal>> {
        Ok(self
            .get_balances()
            .await?
            .into_iter()
            .map(|entry| (entry.asset, entry.available_balance))
            .collect())
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, params);

        let response = self.client.get(&url).query(params).send().await?;
        handle_response(response).await
    }

    /// Signed request; parameters travel in the query string for every method
    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ExchangeError::Authentication(
                "BINANCE_API_KEY and BINANCE_API_SECRET are required for signed requests"
                    .to_string(),
            )
        })?;

        let query = signed_query(
            &credentials.api_secret,
            params,
            self.recv_window_ms,
            timestamp_ms(),
        )?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("{} (signed) {}", method, path);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> ExchangeResult<T> {
    let status = response.status();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse response: {} - Body: {}", e, body);
            ExchangeError::InvalidResponse(e.to_string())
        });
    }

    let api_error = serde_json::from_str::<ApiErrorResponse>(&body).ok();
    Err(map_error(status, retry_after_ms, api_error, body))
}

/// Classify a failed response
pub fn map_error(
    status: StatusCode,
    retry_after_ms: Option<u64>,
    api_error: Option<ApiErrorResponse>,
    body: String,
) -> ExchangeError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return ExchangeError::RateLimited { retry_after_ms };
    }

    match api_error {
        Some(ApiErrorResponse { code, msg }) => match code {
            -1003 => ExchangeError::RateLimited { retry_after_ms },
            -1001 => ExchangeError::Network(msg),
            -1007 | -1021 => ExchangeError::Timeout(msg),
            -1022 | -2014 | -2015 => ExchangeError::Authentication(msg),
            -1121 | -2013 => ExchangeError::NotFound(msg),
            _ if status.is_server_error() => ExchangeError::ServerError(format!("{}: {}", code, msg)),
            _ => ExchangeError::Rejected { code, message: msg },
        },
        None if status.is_server_error() => ExchangeError::ServerError(format!("{}: {}", status, body)),
        None if status == StatusCode::UNAUTHORIZED => ExchangeError::Authentication(body),
        None => ExchangeError::Rejected {
            code: i64::from(status.as_u16()),
            message: body,
        },
    }
}
