use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::clan::*;
use crate::AppState;

pub async fn create_join_request(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateJoinRequestRequest>,
) -> AppResult<(StatusCode, Json<ClanJoinRequest>)> {
    if body.clan_id.trim().is_empty() {
        return Err(AppError::BadRequest("clanId is required".into()));
    }
    let request = state
        .clans
        .create_join_request(body.clan_id.trim(), &user.id, &user.username)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Pending requests for the clan the caller leads; empty for everyone else.
pub async fn my_clan_requests(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let requests = match state.clans.find_clan_by_user(&user.id).await? {
        Some(clan) if clan.is_leader(&user.id) => {
            state.clans.pending_join_requests_for(&clan.id).await?
        }
        _ => Vec::new(),
    };
    Ok(Json(json!({ "requests": requests })))
}

pub async fn respond_join_request(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<RespondRequest>,
) -> AppResult<Json<Value>> {
    match body.parse() {
        Some(ResponseAction::Accept) => {
            state.clans.accept_join_request(&id, &user.id).await?;
            Ok(Json(json!({ "success": true, "status": JoinRequestStatus::Accepted })))
        }
        Some(ResponseAction::Reject) => {
            state.clans.reject_join_request(&id, &user.id).await?;
            Ok(Json(json!({ "success": true, "status": JoinRequestStatus::Rejected })))
        }
        None => Err(AppError::BadRequest("Invalid action".into())),
    }
}
