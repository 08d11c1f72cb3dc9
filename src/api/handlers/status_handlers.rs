use super::super::ApiState;
use crate::sync::SyncStatus;
use axum::{extract::State, response::Json};

/// Last sync pass, or `null` before the first one started.
pub async fn get_sync_status(State(state): State<ApiState>) -> Json<Option<SyncStatus>> {
    Json(state.sync.last_status().await)
}
