// src/dexscreener.rs
use crate::error::SyncError;
use crate::models::TokenMetadata;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Market metadata for a mint; `Ok(None)` means the service has no data
#[async_trait]
pub trait PriceMetadataClient: Send + Sync {
    async fn get_metadata(&self, mint: &str) -> Result<Option<TokenMetadata>, SyncError>;
}

#[derive(Debug, Deserialize)]
struct Pair {
    #[serde(rename = "baseToken")]
    base_token: Option<PairToken>,
    #[serde(rename = "quoteToken")]
    quote_token: Option<PairToken>,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    price_change: Option<PriceChange>,
    info: Option<PairInfo>,
}

#[derive(Debug, Deserialize)]
struct PairToken {
    address: String,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PairInfo {
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

/// Dexscreener `tokens/v1` client
#[derive(Clone)]
pub struct DexscreenerClient {
    http: Client,
    base_url: String,
}

impl DexscreenerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Find `mint` as base or quote token of the first matching pair
fn extract_metadata(mint: &str, pairs: &[Pair]) -> Option<TokenMetadata> {
    for pair in pairs {
        let token = [&pair.base_token, &pair.quote_token]
            .into_iter()
            .flatten()
            .find(|t| t.address == mint);

        if let Some(token) = token {
            // Missing price means zero; a present but unparseable one is unusable
            let price = match pair.price_usd.as_deref() {
                None => Decimal::ZERO,
                Some(raw) => match Decimal::from_str(raw) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Unparseable priceUsd {:?} for {}: {}", raw, mint, e);
                        return None;
                    }
                },
            };

            return Some(TokenMetadata {
                name: token.name.clone().unwrap_or_else(|| "Unknown".to_string()),
                symbol: token.symbol.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
                price,
                price_24h_change: pair
                    .price_change
                    .as_ref()
                    .and_then(|c| c.h24)
                    .and_then(Decimal::from_f64_retain),
                image_url: pair.info.as_ref().and_then(|i| i.image_url.clone()),
            });
        }
    }
    None
}

#[async_trait]
impl PriceMetadataClient for DexscreenerClient {
    async fn get_metadata(&self, mint: &str) -> Result<Option<TokenMetadata>, SyncError> {
        let url = format!("{}/tokens/v1/solana/{}", self.base_url, mint);
        debug!("📡 GET {}", url);

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            s if !s.is_success() => {
                return Err(SyncError::TransientFetch(format!("dexscreener: HTTP {}", s)))
            }
            _ => {}
        }

        let pairs: Vec<Pair> = resp.json().await?;
        if pairs.is_empty() {
            warn!("No token data found for {}", mint);
            return Ok(None);
        }

        let meta = extract_metadata(mint, &pairs);
        match &meta {
            Some(m) => info!("Retrieved data for token {} ({})", m.name, m.symbol),
            None => warn!("Token {} found on Dexscreener but in an unrecognized format", mint),
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(v: serde_json::Value) -> Vec<Pair> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn picks_base_token_with_precise_price() {
        let p = pairs(json!([{
            "chainId": "solana",
            "baseToken": { "address": "MintA", "name": "Alpha", "symbol": "ALP" },
            "quoteToken": { "address": "So11111111111111111111111111111111111111112", "name": "Wrapped SOL", "symbol": "SOL" },
            "priceUsd": "0.00001234",
            "priceChange": { "h24": -12.5 },
            "info": { "imageUrl": "https://cdn.example/alp.png" }
        }]));

        let meta = extract_metadata("MintA", &p).unwrap();
        assert_eq!(meta.name, "Alpha");
        assert_eq!(meta.symbol, "ALP");
        assert_eq!(meta.price, Decimal::from_str("0.00001234").unwrap());
        assert_eq!(meta.price_24h_change, Some(Decimal::from_str("-12.5").unwrap()));
        assert_eq!(meta.image_url.as_deref(), Some("https://cdn.example/alp.png"));
    }

    #[test]
    fn falls_back_to_quote_token() {
        let p = pairs(json!([{
            "baseToken": { "address": "Other", "name": "Other", "symbol": "OTH" },
            "quoteToken": { "address": "MintQ", "name": "Quote", "symbol": "QTE" },
            "priceUsd": "2.5"
        }]));

        let meta = extract_metadata("MintQ", &p).unwrap();
        assert_eq!(meta.symbol, "QTE");
        assert_eq!(meta.price_24h_change, None);
    }

    #[test]
    fn missing_fields_get_placeholders() {
        let p = pairs(json!([{ "baseToken": { "address": "MintA" } }]));

        let meta = extract_metadata("MintA", &p).unwrap();
        assert_eq!(meta.name, "Unknown");
        assert_eq!(meta.symbol, "UNKNOWN");
        assert_eq!(meta.price, Decimal::ZERO);
    }

    #[test]
    fn unrelated_pairs_mean_not_found() {
        let p = pairs(json!([{
            "baseToken": { "address": "X", "symbol": "X" },
            "quoteToken": { "address": "Y", "symbol": "Y" }
        }]));
        assert!(extract_metadata("MintA", &p).is_none());
    }

    #[test]
    fn malformed_price_means_not_found() {
        let p = pairs(json!([{
            "baseToken": { "address": "MintA", "name": "A", "symbol": "A" },
            "priceUsd": "not-a-number"
        }]));
        assert!(extract_metadata("MintA", &p).is_none());
    }

    async fn serve_dexscreener() -> DexscreenerClient {
        use axum::{http::StatusCode, response::Json, routing::get, Router};

        let app = Router::new()
            .route("/tokens/v1/solana/Missing", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/tokens/v1/solana/Flaky",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route("/tokens/v1/solana/Empty", get(|| async { Json(json!([])) }))
            .route(
                "/tokens/v1/solana/MintA",
                get(|| async {
                    Json(json!([{
                        "baseToken": { "address": "MintA", "name": "Alpha", "symbol": "ALP" },
                        "priceUsd": "1.5"
                    }]))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app.into_make_service()).await });

        // trailing slash is trimmed
        DexscreenerClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn http_status_mapping() {
        let client = serve_dexscreener().await;

        assert!(client.get_metadata("Missing").await.unwrap().is_none());
        assert!(client.get_metadata("Empty").await.unwrap().is_none());

        let err = client.get_metadata("Flaky").await.unwrap_err();
        assert!(matches!(err, SyncError::TransientFetch(_)), "got {:?}", err);
        assert!(err.is_retryable());

        let meta = client.get_metadata("MintA").await.unwrap().unwrap();
        assert_eq!(meta.symbol, "ALP");
        assert_eq!(meta.price, Decimal::new(15, 1));
    }
}
