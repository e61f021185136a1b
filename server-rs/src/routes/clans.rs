use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::config::ClanPolicyConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::clan::*;
use crate::AppState;

fn validate_name_and_tag<'a>(
    policy: &ClanPolicyConfig,
    name: &'a str,
    tag: &'a str,
) -> AppResult<(&'a str, &'a str)> {
    let (name, tag) = (name.trim(), tag.trim());
    if name.is_empty() || tag.is_empty() {
        return Err(AppError::BadRequest("Clan name and tag are required".into()));
    }
    if name.chars().count() > policy.name_max_len {
        return Err(AppError::BadRequest(format!(
            "Clan name must be at most {} characters",
            policy.name_max_len
        )));
    }
    if tag.chars().count() > policy.tag_max_len {
        return Err(AppError::BadRequest(format!(
            "Clan tag must be at most {} characters",
            policy.tag_max_len
        )));
    }
    Ok((name, tag))
}

fn validate_logo_url(url: &str) -> AppResult<&str> {
    let url = url.trim();
    let ok = url.starts_with("https://") || url.starts_with("http://") || url.starts_with('/');
    if url.is_empty() || !ok || url.chars().any(char::is_whitespace) {
        return Err(AppError::BadRequest("Invalid logo URL".into()));
    }
    Ok(url)
}

pub async fn list_clans(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let clans = state.clans.list_clans().await?;
    Ok(Json(json!({ "clans": clans })))
}

pub async fn get_clan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Clan>> {
    Ok(Json(state.clans.get_clan(&id).await?))
}

pub async fn my_clan(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let clan = state.clans.find_clan_by_user(&user.id).await?;
    let role = clan.as_ref().map(|c| if c.is_leader(&user.id) { "leader" } else { "member" });
    Ok(Json(json!({ "clan": clan, "role": role })))
}

pub async fn create_clan(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateClanRequest>,
) -> AppResult<(StatusCode, Json<Clan>)> {
    let (name, tag) = validate_name_and_tag(state.clans.policy(), &body.name, &body.tag)?;
    let logo_url = match body.logo_url.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(url) => Some(validate_logo_url(url)?.to_string()),
    };

    let clan = state.clans.create_clan(name, tag, &user.id, logo_url).await?;
    Ok((StatusCode::CREATED, Json(clan)))
}

pub async fn delete_clan(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.clans.delete_clan(&id, &user.id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAvatarRequest>,
) -> AppResult<Json<Clan>> {
    let logo_url = validate_logo_url(&body.logo_url)?;
    let clan = state.clans.update_avatar(&id, &user.id, logo_url).await?;
    Ok(Json(clan))
}

pub async fn leave_clan(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.clans.leave_clan(&id, &user.id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path((id, member_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    state.clans.remove_member(&id, &member_id, &user.id).await?;
    Ok(Json(json!({ "success": true })))
}
