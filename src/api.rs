use axum::{
    extract::Query,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use crate::config::Config;
use crate::db::{SqliteStore, WalletDirectory};
use crate::error::SyncError;
use crate::models::{TokenAccount, TokenEntity};
use tracing::info;
use tower_http::cors::{CorsLayer, Any};
use tokio::task;

#[derive(Deserialize)]
pub struct HoldingsQuery {
    pub wallet: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn router(store: SqliteStore) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Solana holdings sync API running" }))
        .route("/holdings", get({
            let store = store.clone();
            move |q: Query<HoldingsQuery>| {
                let store = store.clone();
                async move { get_holdings(store, q.0.wallet).await }
            }
        }))
        .route("/tokens", get({
            let store = store.clone();
            move || {
                let store = store.clone();
                async move { get_tokens(store).await }
            }
        }))
        .route("/wallets", get({
            let store = store.clone();
            move || {
                let store = store.clone();
                async move { get_wallets(store).await }
            }
        }))
        .layer(cors)
}

pub async fn serve(cfg: Config, store: SqliteStore) -> eyre::Result<()> {
    let app = router(store);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ---------- DB wrappers (spawn_blocking) ----------

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    match task::spawn_blocking(f).await {
        Ok(Ok(v)) => Ok(Json(v)),
        Ok(Err(e)) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("task failed: {}", e))),
    }
}

async fn get_holdings(store: SqliteStore, wallet: String) -> ApiResult<Vec<TokenAccount>> {
    blocking(move || store.token_accounts_by_wallet(&wallet)).await
}

async fn get_tokens(store: SqliteStore) -> ApiResult<Vec<TokenEntity>> {
    blocking(move || store.all_tokens()).await
}

async fn get_wallets(store: SqliteStore) -> ApiResult<Vec<String>> {
    blocking(move || store.list_monitored_wallets()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_store, HoldingsStore};
    use crate::models::TokenMetadata;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn holdings_include_token_name_and_price() {
        let store = memory_store();
        let meta = TokenMetadata {
            name: "Bonk".into(),
            symbol: "BONK".into(),
            price: Decimal::new(2, 5),
            price_24h_change: None,
            image_url: None,
        };
        store.upsert_token_entity("MintB", &meta).unwrap();
        store.upsert_token_account("W1", "MintB", 1_000, 5, Some("BONK")).unwrap();

        let Json(rows) = get_holdings(store.clone(), "W1".into()).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_name.as_deref(), Some("Bonk"));
        assert_eq!(rows[0].token_price, Some(Decimal::new(2, 5)));

        let Json(tokens) = get_tokens(store).await.unwrap();
        assert_eq!(tokens[0].symbol, "BONK");
    }

    #[tokio::test]
    async fn wallets_route_lists_directory() {
        let store = memory_store();
        store.add_wallet("W1").unwrap();

        let Json(wallets) = get_wallets(store).await.unwrap();
        assert_eq!(wallets, vec!["W1".to_string()]);
    }
}
