use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clan {
    pub id: String,
    pub name: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub leader_id: String,
    /// Always contains `leader_id`.
    pub member_ids: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Clan {
    pub fn is_leader(&self, user_id: &str) -> bool {
        self.leader_id == user_id
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.leader_id == user_id || self.member_ids.iter().any(|m| m == user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    #[serde(alias = "rejected")]
    Declined,
}

/// `clan_name`, `from_username` and `to_username` are snapshots taken when the
/// invitation is created. They are not updated on rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanInvitation {
    pub id: String,
    pub clan_id: String,
    pub clan_name: String,
    pub from_user_id: String,
    pub from_username: String,
    pub to_user_id: String,
    pub to_username: String,
    pub status: InvitationStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub responded_at: Option<DateTime<Utc>>,
}

impl ClanInvitation {
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// `clan_name` and `from_username` are snapshots, same as on invitations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanJoinRequest {
    pub id: String,
    pub clan_id: String,
    pub clan_name: String,
    pub from_user_id: String,
    pub from_username: String,
    pub status: JoinRequestStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl ClanJoinRequest {
    pub fn is_pending(&self) -> bool {
        self.status == JoinRequestStatus::Pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    #[serde(rename = "clansDeleted")]
    pub clans_deleted: usize,
    #[serde(rename = "invitationsDeleted")]
    pub invitations_deleted: usize,
    #[serde(rename = "joinRequestsDeleted")]
    pub join_requests_deleted: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateClanRequest {
    pub name: String,
    pub tag: String,
    #[serde(rename = "logoUrl")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAvatarRequest {
    #[serde(rename = "logoUrl")]
    pub logo_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    #[serde(rename = "clanId")]
    pub clan_id: String,
    #[serde(rename = "toUserId")]
    pub to_user_id: String,
    #[serde(rename = "toUsername")]
    pub to_username: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateJoinRequestRequest {
    #[serde(rename = "clanId")]
    pub clan_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: String,
}

impl RespondRequest {
    pub fn parse(&self) -> Option<ResponseAction> {
        match self.action.as_str() {
            "accept" => Some(ResponseAction::Accept),
            "reject" | "decline" => Some(ResponseAction::Reject),
            _ => None,
        }
    }
}
