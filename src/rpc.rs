// src/rpc.rs
use crate::error::SyncError;
use crate::models::{Holding, NATIVE_DECIMALS, NATIVE_SYMBOL, WRAPPED_SOL_MINT};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP7VEwdxnfJc5eJ7Pd6nQ8ft8RPD8f2";

/// JSON-RPC "invalid params" code returned for malformed pubkeys
const INVALID_PARAMS: i64 = -32602;

/// Current token holdings of a wallet, native SOL included
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_holdings(&self, wallet: &str) -> Result<Vec<Holding>, SyncError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    account: AccountData,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
struct TokenAccountInfo {
    mint: String,
    #[serde(rename = "tokenAmount")]
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String, // raw u64 as decimal string
    decimals: u8,
}

/// Base58 pubkeys decode to exactly 32 bytes
pub fn validate_address(address: &str) -> Result<(), SyncError> {
    match bs58::decode(address).into_vec() {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => Err(SyncError::InvalidAddress(address.to_string())),
    }
}

/// Solana JSON-RPC ledger client
#[derive(Clone)]
pub struct SolanaRpcClient {
    http: Client,
    rpc_url: String,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            rpc_url: rpc_url.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, SyncError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!("📡 Sending {} → {}", method, self.rpc_url);

        let resp = self.http.post(&self.rpc_url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(SyncError::TransientFetch(format!(
                "{}: HTTP {}",
                method,
                resp.status()
            )));
        }

        let parsed: RpcResponse<T> = resp.json().await?;
        unwrap_rpc(method, parsed, &params)
    }

    async fn token_holdings(&self, wallet: &str, program_id: &str) -> Result<Vec<Holding>, SyncError> {
        let accounts: WithContext<Vec<Value>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([wallet, { "programId": program_id }, { "encoding": "jsonParsed" }]),
            )
            .await?;
        Ok(parse_token_accounts(accounts.value))
    }
}

fn unwrap_rpc<T>(method: &str, resp: RpcResponse<T>, params: &Value) -> Result<T, SyncError> {
    if let Some(err) = resp.error {
        if err.code == INVALID_PARAMS {
            let subject = params
                .get(0)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(SyncError::InvalidAddress(subject));
        }
        return Err(SyncError::TransientFetch(format!(
            "{}: RPC error {} {}",
            method, err.code, err.message
        )));
    }
    resp.result
        .ok_or_else(|| SyncError::TransientFetch(format!("{}: empty RPC result", method)))
}

/// Turn `jsonParsed` token accounts into one holding per mint.
///
/// A wallet may own several token accounts for the same mint; their raw
/// amounts are summed. Entries that don't parse are logged and dropped.
fn parse_token_accounts(accounts: Vec<Value>) -> Vec<Holding> {
    let mut by_mint: BTreeMap<String, Holding> = BTreeMap::new();

    for raw in accounts {
        let keyed: KeyedAccount = match serde_json::from_value(raw) {
            Ok(k) => k,
            Err(e) => {
                warn!("Skipping unparseable token account: {}", e);
                continue;
            }
        };
        let info = keyed.account.data.parsed.info;
        let amount = match info.token_amount.amount.parse::<u64>() {
            Ok(a) => a,
            Err(e) => {
                warn!("Skipping token account for {} with bad amount: {}", info.mint, e);
                continue;
            }
        };

        by_mint
            .entry(info.mint.clone())
            .and_modify(|h| h.raw_balance = h.raw_balance.saturating_add(amount))
            .or_insert(Holding {
                mint: info.mint,
                raw_balance: amount,
                decimals: info.token_amount.decimals,
                symbol_hint: None,
            });
    }

    by_mint.into_values().collect()
}

#[async_trait]
impl LedgerClient for SolanaRpcClient {
    async fn get_holdings(&self, wallet: &str) -> Result<Vec<Holding>, SyncError> {
        validate_address(wallet)?;

        let mut holdings = self.token_holdings(wallet, TOKEN_PROGRAM_ID).await?;
        holdings.extend(self.token_holdings(wallet, TOKEN_2022_PROGRAM_ID).await?);

        let lamports: WithContext<u64> = self.call("getBalance", json!([wallet])).await?;

        // wSOL token accounts share the native mint; fold them into one entry
        let wrapped: u64 = holdings
            .iter()
            .filter(|h| h.mint == WRAPPED_SOL_MINT)
            .map(|h| h.raw_balance)
            .fold(0, u64::saturating_add);
        holdings.retain(|h| h.mint != WRAPPED_SOL_MINT);
        holdings.push(native_holding(lamports.value, wrapped));

        info!("Found {} holdings for wallet {}", holdings.len(), wallet);
        Ok(holdings)
    }
}

fn native_holding(lamports: u64, wrapped: u64) -> Holding {
    Holding {
        mint: WRAPPED_SOL_MINT.to_string(),
        raw_balance: lamports.saturating_add(wrapped),
        decimals: NATIVE_DECIMALS,
        symbol_hint: Some(NATIVE_SYMBOL.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(mint: &str, amount: &str, decimals: u8) -> Value {
        json!({
            "pubkey": "5ZWj7a1f8tWkjBESHKgrLmXshuXxqeY9SYcfbshpAqPG",
            "account": {
                "data": {
                    "program": "spl-token",
                    "parsed": {
                        "type": "account",
                        "info": {
                            "mint": mint,
                            "owner": "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
                            "tokenAmount": {
                                "amount": amount,
                                "decimals": decimals,
                                "uiAmount": 0.0,
                                "uiAmountString": "0"
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn sums_accounts_sharing_a_mint() {
        let holdings = parse_token_accounts(vec![
            account("MintA", "100", 6),
            account("MintB", "7", 0),
            account("MintA", "50", 6),
        ]);

        assert_eq!(holdings.len(), 2);
        let a = holdings.iter().find(|h| h.mint == "MintA").unwrap();
        assert_eq!(a.raw_balance, 150);
        assert_eq!(a.decimals, 6);
    }

    #[test]
    fn zero_balance_accounts_are_kept() {
        let holdings = parse_token_accounts(vec![account("MintA", "0", 9)]);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].raw_balance, 0);
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let holdings = parse_token_accounts(vec![
            json!({ "account": { "data": ["base64", "AAAA"] } }),
            account("MintA", "not-a-number", 6),
            account("MintB", "18446744073709551615", 0),
        ]);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].raw_balance, u64::MAX);
    }

    #[test]
    fn invalid_params_maps_to_invalid_address() {
        let resp: RpcResponse<u64> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param: Invalid" }
        }))
        .unwrap();
        let err = unwrap_rpc("getBalance", resp, &json!(["bogus"])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidAddress(a) if a == "bogus"));
    }

    #[test]
    fn other_rpc_errors_are_transient() {
        let resp: RpcResponse<u64> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "Node is behind" }
        }))
        .unwrap();
        let err = unwrap_rpc("getBalance", resp, &json!(["x"])).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn validates_base58_pubkeys() {
        assert!(validate_address("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM").is_ok());
        assert!(validate_address(WRAPPED_SOL_MINT).is_ok());
        assert!(validate_address("0xdeadbeef").is_err());
        assert!(validate_address("").is_err());
    }

    #[test]
    fn native_entry_uses_wrapped_mint_even_when_empty() {
        let h = native_holding(0, 0);
        assert_eq!(h.mint, WRAPPED_SOL_MINT);
        assert_eq!(h.raw_balance, 0);
        assert_eq!(h.decimals, 9);
        assert_eq!(native_holding(5, 7).raw_balance, 12);
    }

    async fn serve_rpc(app: axum::Router) -> SolanaRpcClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app.into_make_service()).await });
        SolanaRpcClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap()
    }

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[tokio::test]
    async fn http_error_status_is_transient() {
        use axum::{http::StatusCode, routing::post};

        let client = serve_rpc(
            axum::Router::new().route("/", post(|| async { StatusCode::SERVICE_UNAVAILABLE })),
        )
        .await;

        let err = client.get_holdings(WALLET).await.unwrap_err();
        assert!(matches!(err, SyncError::TransientFetch(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invalid_params_over_http_is_not_retryable() {
        use axum::{response::Json, routing::post};

        let client = serve_rpc(axum::Router::new().route(
            "/",
            post(|| async {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32602, "message": "Invalid param: WrongSize" }
                }))
            }),
        ))
        .await;

        let err = client.get_holdings(WALLET).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidAddress(ref a) if a == WALLET));
    }

    #[tokio::test]
    async fn holdings_merge_both_programs_and_native_balance() {
        use axum::{response::Json, routing::post};

        let client = serve_rpc(axum::Router::new().route(
            "/",
            post(|Json(req): Json<Value>| async move {
                let result = match req["method"].as_str() {
                    Some("getBalance") => json!({ "context": { "slot": 1 }, "value": 10 }),
                    _ if req["params"][1]["programId"] == TOKEN_PROGRAM_ID => json!({
                        "context": { "slot": 1 },
                        "value": [account("MintA", "500", 6), account(WRAPPED_SOL_MINT, "7", 9)]
                    }),
                    _ => json!({ "context": { "slot": 1 }, "value": [account("MintB", "3", 2)] }),
                };
                Json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
            }),
        ))
        .await;

        let holdings = client.get_holdings(WALLET).await.unwrap();
        let find = |mint: &str| holdings.iter().find(|h| h.mint == mint).cloned();

        assert_eq!(holdings.len(), 3);
        assert_eq!(find("MintA").map(|h| h.raw_balance), Some(500));
        assert_eq!(find("MintB").map(|h| h.decimals), Some(2));
        assert_eq!(find(WRAPPED_SOL_MINT).map(|h| h.raw_balance), Some(17));
    }
}
