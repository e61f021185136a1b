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

pub async fn list_my_invitations(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let invitations = state.clans.pending_invitations_for(&user.id).await?;
    Ok(Json(json!({ "invitations": invitations })))
}

pub async fn create_invitation(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateInvitationRequest>,
) -> AppResult<(StatusCode, Json<ClanInvitation>)> {
    let clan_id = body.clan_id.trim();
    let to_user_id = body.to_user_id.trim();
    let to_username = body.to_username.trim();
    if clan_id.is_empty() || to_user_id.is_empty() || to_username.is_empty() {
        return Err(AppError::BadRequest(
            "clanId, toUserId and toUsername are required".into(),
        ));
    }

    // Inviting is a leader privilege.
    let clan = state.clans.get_clan(clan_id).await?;
    if !clan.is_leader(&user.id) {
        return Err(AppError::Forbidden("You are not allowed to invite to this clan".into()));
    }

    let invitation = state
        .clans
        .create_invitation(&clan.id, &user.id, &user.username, to_user_id, to_username)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn respond_invitation(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<RespondRequest>,
) -> AppResult<Json<Value>> {
    match body.parse() {
        Some(ResponseAction::Accept) => {
            state.clans.accept_invitation(&id, &user.id).await?;
            Ok(Json(json!({ "success": true, "status": InvitationStatus::Accepted })))
        }
        Some(ResponseAction::Reject) => {
            state.clans.reject_invitation(&id, &user.id).await?;
            Ok(Json(json!({ "success": true, "status": InvitationStatus::Declined })))
        }
        None => Err(AppError::BadRequest("Invalid action".into())),
    }
}
