use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::AppState;

pub async fn delete_clan(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let clan = state.clans.admin_delete_clan(&id).await?;
    tracing::info!(admin_id = %admin.id, clan_id = %clan.id, name = %clan.name, "admin removed clan");
    Ok(Json(json!({ "success": true })))
}

pub async fn cleanup(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let report = state.clans.purge_all().await?;
    tracing::warn!(admin_id = %admin.id, "clan data cleanup requested");
    Ok(Json(json!({ "message": "Cleanup completed", "results": report })))
}
