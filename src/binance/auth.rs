//! Request signing for Binance signed endpoints

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `query` keyed by `secret`, hex encoded
pub fn sign(secret: &str, query: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Authentication(format!("Failed to create HMAC: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Current time in milliseconds, as Binance expects in `timestamp`
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Url-encode `params`, append `recvWindow` and `timestamp`, then the signature
///
/// Returns the full query string ready to send.
pub fn signed_query(
    secret: &str,
    params: &[(&str, String)],
    recv_window_ms: u64,
    timestamp: i64,
) -> ExchangeResult<String> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("recvWindow", &recv_window_ms.to_string());
    serializer.append_pair("timestamp", &timestamp.to_string());
    let query = serializer.finish();

    let signature = sign(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Example from the Binance API documentation
    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    #[test]
    fn test_sign_matches_documented_signature() {
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let signature = sign(DOC_SECRET, query).unwrap();
        assert_eq!(
            signature,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signed_query_appends_window_timestamp_and_signature() {
        let params = [
            ("symbol", "LTCBTC".to_string()),
            ("side", "BUY".to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", "1".to_string()),
            ("price", "0.1".to_string()),
        ];
        let query = signed_query(DOC_SECRET, &params, 5000, 1499827319559).unwrap();
        assert!(query.starts_with("symbol=LTCBTC&side=BUY"));
        assert!(query.ends_with(
            "recvWindow=5000&timestamp=1499827319559&signature=c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        ));
    }

    #[test]
    fn test_timestamp_is_milliseconds() {
        // Anything after 2020 in ms has 13 digits
        assert_eq!(timestamp_ms().to_string().len(), 13);
    }
}
