use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::AppState;

/// Pending invitation count for the bell icon. Anonymous callers get zero.
pub async fn count(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
) -> AppResult<Json<Value>> {
    let count = match user {
        Some(Extension(u)) => state.clans.count_pending_notifications(&u.id).await?,
        None => 0,
    };
    Ok(Json(json!({ "count": count })))
}
