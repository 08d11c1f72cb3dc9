use super::super::ApiState;
use crate::error::AppResult;
use crate::series::Point;
use crate::types::*;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};

pub async fn get_tokens(
    Query(params): Query<TokenListParams>,
    State(state): State<ApiState>,
) -> AppResult<Json<TokenListResponse>> {
    let page = state.tokens.list(&params.into_query()).await?;
    Ok(Json(TokenListResponse::from(page)))
}

pub async fn get_token(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> AppResult<Json<TokenResponse>> {
    let item = state.tokens.resolve(&id).await?;
    Ok(Json(TokenResponse::from(&item)))
}

pub async fn get_token_pairs(
    Path(id): Path<String>,
    Query(params): Query<PairsParams>,
    State(state): State<ApiState>,
) -> AppResult<Json<PairsResponse>> {
    let pairs = state.tokens.pairs(&id, params.limit()).await?;
    Ok(Json(PairsResponse::from(pairs)))
}

pub async fn get_token_holders(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> AppResult<Json<Vec<Point>>> {
    Ok(Json(state.tokens.holders(&id).await?))
}

pub async fn get_token_swaps(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> AppResult<Json<Vec<Point>>> {
    Ok(Json(state.tokens.swaps(&id).await?))
}
