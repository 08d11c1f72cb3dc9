use super::{handlers, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Token routes; `:id` is an internal id or a CMC slug
        .route("/api/rest/tokens", get(handlers::get_tokens))
        .route("/api/rest/token/:id", get(handlers::get_token))
        .route("/api/rest/token/:id/pairs", get(handlers::get_token_pairs))
        .route("/api/rest/token/:id/holders", get(handlers::get_token_holders))
        .route("/api/rest/token/:id/swaps", get(handlers::get_token_swaps))

        // DEX pass-through
        .route("/api/rest/cmc/dex/pairs-info", post(handlers::post_pairs_info))
        .route("/api/rest/cmc/dex/pairs-list", get(handlers::get_pairs_list))
        .route("/api/rest/cmc/dex/transactions", post(handlers::post_transactions))

        // Status
        .route("/api/rest/status/sync", get(handlers::get_sync_status))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
