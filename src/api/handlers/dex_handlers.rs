use super::super::ApiState;
use crate::chains;
use crate::error::AppResult;
use crate::providers::{DexTransaction, PairListEntry};
use crate::types::*;
use axum::{
    extract::{Query, State},
    response::Json,
};
use serde_json::{Map, Value};

/// Entries without a USD price are not usable by clients and are dropped.
pub async fn post_pairs_info(
    State(state): State<ApiState>,
    Json(request): Json<PairsInfoRequest>,
) -> AppResult<Json<Map<String, Value>>> {
    let info = state.dex.pairs_info(&request).await?;
    let priced = info
        .into_iter()
        .filter(|(_, value)| value.get("priceUsd").is_some())
        .collect();
    Ok(Json(priced))
}

pub async fn get_pairs_list(
    Query(params): Query<PairsListParams>,
    State(state): State<ApiState>,
) -> Json<PairsListResponse> {
    let eth_pairs = match &params.eth_address {
        Some(address) => capped(state.dex.pairs_list(address, chains::ETHEREUM.cmc_platform_id).await),
        None => Vec::new(),
    };
    let btc_pairs = match &params.btc_address {
        Some(address) => capped(
            state
                .dex
                .pairs_list(address, chains::BINANCE_SMART_CHAIN.cmc_platform_id)
                .await,
        ),
        None => Vec::new(),
    };

    Json(PairsListResponse { eth_pairs, btc_pairs })
}

fn capped(mut entries: Vec<PairListEntry>) -> Vec<PairListEntry> {
    entries.truncate(PAIR_LIST_CAP);
    entries
}

pub async fn post_transactions(
    State(state): State<ApiState>,
    Json(request): Json<TransactionsRequest>,
) -> AppResult<Json<Vec<DexTransaction>>> {
    Ok(Json(state.dex.transactions(&request).await?))
}
