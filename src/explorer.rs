//! Explorer client: lifetime transaction summary for one address.
//!
//! ## API Reference
//!
//! Endpoint: `GET https://www.oklink.com/api/v5/explorer/address/address-summary`
//! Query: `chainShortName`, `address`
//! Header: `Ok-Access-Key`
//!
//! Response envelope: `{ "code": "0", "msg": "", "data": [ ... ] }` where each
//! `data` item carries `firstTransactionTime`, `lastTransactionTime` (epoch
//! milliseconds as strings) and `receiveAmount` (numeric string).

use crate::deduplication::AddressChainKey;
use crate::error::EnrichmentFailure;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str =
    "https://www.oklink.com/api/v5/explorer/address/address-summary";

const API_KEY_HEADER: &str = "Ok-Access-Key";

/// One summarized transaction record, decoded from the explorer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionItem {
    /// Informational only; never used for bucketing
    pub first_seen_epoch_millis: Option<i64>,
    pub last_seen_epoch_millis: i64,
    pub receive_amount_native: Decimal,
}

impl TransactionItem {
    pub fn new(last_seen_epoch_millis: i64, receive_amount_native: Decimal) -> Self {
        TransactionItem {
            first_seen_epoch_millis: None,
            last_seen_epoch_millis,
            receive_amount_native,
        }
    }
}

/// Outcome of one lookup
pub type FetchResult = Result<Vec<TransactionItem>, EnrichmentFailure>;

/// Anything that can answer "what did this address receive".
///
/// The live explorer client implements this; so does the snapshot replayer.
/// Implementations are shared across fetch workers.
pub trait SummarySource: Send + Sync {
    fn fetch_summary(&self, key: &AddressChainKey) -> FetchResult;
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    code: Option<String>,
    msg: Option<String>,
    data: Option<Vec<SummaryItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryItem {
    first_transaction_time: Option<String>,
    last_transaction_time: Option<String>,
    receive_amount: Option<String>,
}

impl SummaryItem {
    fn decode(self, index: usize) -> Result<TransactionItem, EnrichmentFailure> {
        let last = self
            .last_transaction_time
            .as_deref()
            .and_then(|t| t.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                EnrichmentFailure::Malformed(format!("item {}: bad lastTransactionTime", index))
            })?;

        let amount = self
            .receive_amount
            .as_deref()
            .map(str::trim)
            .and_then(|a| {
                Decimal::from_str(a)
                    .or_else(|_| Decimal::from_scientific(a))
                    .ok()
            })
            .filter(|a| *a >= Decimal::ZERO)
            .ok_or_else(|| {
                EnrichmentFailure::Malformed(format!("item {}: bad receiveAmount", index))
            })?;

        Ok(TransactionItem {
            first_seen_epoch_millis: self
                .first_transaction_time
                .as_deref()
                .and_then(|t| t.trim().parse::<i64>().ok()),
            last_seen_epoch_millis: last,
            receive_amount_native: amount,
        })
    }
}

/// Decode an explorer response body.
///
/// A non-zero `code`, a missing `data` field or an undecodable item fails the
/// whole pair.
pub fn parse_summary(body: &str) -> FetchResult {
    let envelope: SummaryEnvelope = serde_json::from_str(body)
        .map_err(|e| EnrichmentFailure::Malformed(e.to_string()))?;

    if let Some(code) = envelope.code.as_deref() {
        if code != "0" {
            return Err(EnrichmentFailure::Api {
                code: code.to_string(),
                message: envelope.msg.unwrap_or_default(),
            });
        }
    }

    let data = envelope.data.ok_or(EnrichmentFailure::MissingData)?;

    data.into_iter()
        .enumerate()
        .map(|(i, item)| item.decode(i))
        .collect()
}

// ============================================================================
// LIVE CLIENT
// ============================================================================

pub struct ExplorerClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl ExplorerClient {
    /// Build a client. `timeout` of `None` keeps the transport default.
    pub fn new(endpoint: &str, api_key: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(ExplorerClient {
            http: builder.build()?,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SummarySource for ExplorerClient {
    fn fetch_summary(&self, key: &AddressChainKey) -> FetchResult {
        let response = self
            .http
            .get(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[
                ("chainShortName", key.chain.as_str()),
                ("address", key.address.as_str()),
            ])
            .send()
            .map_err(|e| EnrichmentFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentFailure::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| EnrichmentFailure::Transport(e.to_string()))?;

        parse_summary(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serve one canned HTTP response; the handle yields the raw request head.
    fn create_test_server(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/summary", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, handle)
    }

    #[test]
    fn test_parse_ok_payload() {
        let body = r#"{
            "code": "0",
            "msg": "",
            "data": [
                {
                    "firstTransactionTime": "1609459200000",
                    "lastTransactionTime": "1612137600000",
                    "receiveAmount": "1.5"
                },
                {"lastTransactionTime": "1612137600000", "receiveAmount": "0"}
            ]
        }"#;

        let items = parse_summary(body).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].first_seen_epoch_millis, Some(1_609_459_200_000));
        assert_eq!(items[0].last_seen_epoch_millis, 1_612_137_600_000);
        assert_eq!(items[0].receive_amount_native, Decimal::from_str("1.5").unwrap());
        assert_eq!(items[1].first_seen_epoch_millis, None);
    }

    #[test]
    fn test_empty_data_is_success() {
        assert!(parse_summary(r#"{"code":"0","data":[]}"#).unwrap().is_empty());
        assert!(parse_summary(r#"{"data":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_missing_data_fails() {
        assert_eq!(
            parse_summary(r#"{"code":"0","msg":""}"#),
            Err(EnrichmentFailure::MissingData)
        );
    }

    #[test]
    fn test_api_error_code_fails() {
        let result = parse_summary(r#"{"code":"50011","msg":"Rate limit","data":[]}"#);

        assert_eq!(
            result,
            Err(EnrichmentFailure::Api {
                code: "50011".to_string(),
                message: "Rate limit".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_bodies_fail() {
        assert!(matches!(
            parse_summary("<html>bad gateway</html>"),
            Err(EnrichmentFailure::Malformed(_))
        ));
        let bad_time = r#"{"data":[{"lastTransactionTime":"yesterday","receiveAmount":"1"}]}"#;
        assert!(matches!(
            parse_summary(bad_time),
            Err(EnrichmentFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_summary(r#"{"data":[{"lastTransactionTime":"1612137600000"}]}"#),
            Err(EnrichmentFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_client_keeps_endpoint() {
        let timeout = Some(Duration::from_secs(5));
        let client = ExplorerClient::new(DEFAULT_ENDPOINT, "key", timeout).unwrap();
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_client_sends_key_and_query() {
        let body = r#"{"code":"0","data":[
            {"lastTransactionTime":"1612137600000","receiveAmount":"2"}
        ]}"#;
        let (url, server) = create_test_server("200 OK", body);
        let timeout = Some(Duration::from_secs(5));
        let client = ExplorerClient::new(&url, "secret-key", timeout).unwrap();

        let items = client
            .fetch_summary(&AddressChainKey::new("bc1qabc", "BTC"))
            .unwrap();
        let request = server.join().unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].receive_amount_native, Decimal::from(2));
        assert!(request.starts_with("GET /summary?chainShortName=BTC&address=bc1qabc "));
        assert!(request.to_lowercase().contains("ok-access-key: secret-key"));
    }

    #[test]
    fn test_client_maps_error_status() {
        let (url, server) = create_test_server("500 Internal Server Error", "oops");
        let client = ExplorerClient::new(&url, "secret-key", None).unwrap();

        let result = client.fetch_summary(&AddressChainKey::new("TXyz", "USDT"));
        server.join().unwrap();

        assert_eq!(result, Err(EnrichmentFailure::HttpStatus(500)));
    }
}
