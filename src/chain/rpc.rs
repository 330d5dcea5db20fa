//! JSON-RPC chain client.
//!
//! Talks to any EVM-compatible node over HTTP using `eth_blockNumber`,
//! `eth_getBlockByNumber` and `eth_call`. Feed contract calls are encoded
//! by hand: a 4-byte selector followed by 32-byte big-endian words.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::chain::ChainClient;
use crate::types::{Epoch, Feed, Prediction};

// ---------------------------------------------------------------------------
// Contract selectors
// ---------------------------------------------------------------------------

/// curEpoch()
const CUR_EPOCH_SELECTOR: &str = "d8887315";
/// secondsPerEpoch()
const SECONDS_PER_EPOCH_SELECTOR: &str = "580c8f3d";
/// getAggPredval(uint256)
const GET_AGG_PREDVAL_SELECTOR: &str = "aa6920e3";

/// Size of one ABI word in bytes.
const WORD: usize = 32;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RpcChainClient {
    http: Client,
    rpc_url: SecretString,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(rpc_url: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http,
            rpc_url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let resp = self
            .http
            .post(self.rpc_url.expose_secret())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{method} HTTP error {status}: {body}");
        }

        let response: JsonRpcResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {method} response"))?;

        if let Some(err) = response.error {
            bail!("{method} RPC error: {err}");
        }
        match response.result {
            Some(Value::Null) | None => Err(anyhow!("{method} returned no result")),
            Some(result) => Ok(result),
        }
    }

    async fn call(&self, to: &str, data: String) -> Result<Vec<u8>> {
        let result = self
            .request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| anyhow!("eth_call result is not a string"))?;
        hex::decode(hex_str.trim_start_matches("0x")).context("Failed to decode eth_call result")
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn current_block_number(&self) -> Result<u64> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| anyhow!("eth_blockNumber result is not a string"))?;
        parse_quantity(hex_str)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let result = self
            .request("eth_getBlockByNumber", json!([format!("0x{number:x}"), false]))
            .await?;
        let header: BlockHeader =
            serde_json::from_value(result).context("Failed to parse block header")?;
        parse_quantity(&header.timestamp)
    }

    async fn current_epoch(&self, feed: &Feed) -> Result<Epoch> {
        let data = encode_call(CUR_EPOCH_SELECTOR, &[]);
        let bytes = self.call(&feed.address, data).await?;
        let epoch = decode_u64(&bytes, 0).context("Failed to decode curEpoch()")?;
        debug!(feed = %feed.address, epoch, "Read current epoch");
        Ok(epoch)
    }

    async fn seconds_per_epoch(&self, address: &str) -> Result<u64> {
        let data = encode_call(SECONDS_PER_EPOCH_SELECTOR, &[]);
        let bytes = self.call(address, data).await?;
        decode_u64(&bytes, 0).context("Failed to decode secondsPerEpoch()")
    }

    async fn aggregated_prediction(&self, feed: &Feed, epoch: Epoch) -> Result<Prediction> {
        let epoch_end = epoch
            .checked_add(1)
            .and_then(|e| e.checked_mul(feed.seconds_per_epoch))
            .ok_or_else(|| anyhow!("epoch {epoch} end timestamp overflows"))?;
        let data = encode_call(GET_AGG_PREDVAL_SELECTOR, &[epoch_end as u128]);
        let bytes = self.call(&feed.address, data).await?;
        let numerator = decode_u128(&bytes, 0).context("Failed to decode prediction numerator")?;
        let denominator =
            decode_u128(&bytes, 1).context("Failed to decode prediction denominator")?;
        Ok(Prediction::new(numerator, denominator))
    }
}

// ---------------------------------------------------------------------------
// ABI helpers
// ---------------------------------------------------------------------------

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(s: &str) -> Result<u64> {
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        bail!("empty hex quantity");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: {s}"))
}

/// Build calldata: selector followed by one word per argument.
fn encode_call(selector: &str, args: &[u128]) -> String {
    let mut data = format!("0x{selector}");
    for arg in args {
        data.push_str(&format!("{arg:064x}"));
    }
    data
}

fn word(bytes: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * WORD;
    bytes
        .get(start..start + WORD)
        .ok_or_else(|| anyhow!("response too short: {} bytes, need word {index}", bytes.len()))
}

fn decode_u128(bytes: &[u8], index: usize) -> Result<u128> {
    let w = word(bytes, index)?;
    let (high, low) = w.split_at(WORD - 16);
    if high.iter().any(|b| *b != 0) {
        bail!("word {index} exceeds u128");
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(low);
    Ok(u128::from_be_bytes(buf))
}

fn decode_u64(bytes: &[u8], index: usize) -> Result<u64> {
    let value = decode_u128(bytes, index)?;
    u64::try_from(value).map_err(|_| anyhow!("word {index} exceeds u64"))
}
