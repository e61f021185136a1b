use chrono::Utc;

use super::clans::{new_id, rejected, ClanService};
use crate::error::{ClanError, ClanResult};
use crate::models::{ClanInvitation, InvitationStatus};
use crate::services::membership;

impl ClanService {
    /// Offers membership of `clan_id` to `to_user_id`. The caller checks that
    /// `from_user_id` is allowed to invite for this clan.
    pub async fn create_invitation(
        &self,
        clan_id: &str,
        from_user_id: &str,
        from_username: &str,
        to_user_id: &str,
        to_username: &str,
    ) -> ClanResult<ClanInvitation> {
        let (clan_id, from_user_id, from_username, to_user_id, to_username) = (
            clan_id.to_string(),
            from_user_id.to_string(),
            from_username.to_string(),
            to_user_id.to_string(),
            to_username.to_string(),
        );
        self.write(move |svc| {
            let clans = svc.clans.load();
            let clan = clans
                .get(&clan_id)
                .ok_or_else(|| rejected("create_invitation", ClanError::NotFound("Clan")))?;

            if membership::is_in_any_clan(&clans, &to_user_id) {
                return Err(rejected(
                    "create_invitation",
                    ClanError::Conflict("That user already belongs to a clan"),
                ));
            }

            let mut invitations = svc.invitations.load();
            if invitations
                .values()
                .any(|inv| inv.to_user_id == to_user_id && inv.is_pending())
            {
                return Err(rejected(
                    "create_invitation",
                    ClanError::Conflict("That user already has a pending invitation"),
                ));
            }

            let invitation = ClanInvitation {
                id: new_id("inv"),
                clan_id: clan.id.clone(),
                clan_name: clan.name.clone(),
                from_user_id,
                from_username,
                to_user_id,
                to_username,
                status: InvitationStatus::Pending,
                created_at: Utc::now(),
                responded_at: None,
            };
            invitations.insert(invitation.id.clone(), invitation.clone());
            svc.invitations.save(&invitations)?;

            tracing::info!(
                invitation_id = %invitation.id,
                clan_id = %invitation.clan_id,
                from_user_id = %invitation.from_user_id,
                to_user_id = %invitation.to_user_id,
                "clan invitation created"
            );
            Ok(invitation)
        })
        .await
    }

    pub async fn accept_invitation(&self, invitation_id: &str, user_id: &str) -> ClanResult<()> {
        let (invitation_id, user_id) = (invitation_id.to_string(), user_id.to_string());
        self.write(move |svc| {
            let mut invitations = svc.invitations.load();
            let invitation =
                answerable(invitations.get_mut(&invitation_id), &user_id, "accept_invitation")?;

            let clans = svc.clans.load();
            // Time has passed since the invitation was sent.
            if membership::is_in_any_clan(&clans, &user_id) {
                return Err(rejected(
                    "accept_invitation",
                    ClanError::Conflict("You already belong to a clan"),
                ));
            }
            let mut updated = clans.clone();
            let clan = updated
                .get_mut(&invitation.clan_id)
                .ok_or_else(|| rejected("accept_invitation", ClanError::NotFound("Clan")))?;
            clan.member_ids.push(user_id.clone());
            let clan_id = clan.id.clone();

            invitation.status = InvitationStatus::Accepted;
            invitation.responded_at = Some(Utc::now());

            svc.save_clans_then(&clans, &updated, || svc.invitations.save(&invitations))?;

            tracing::info!(%invitation_id, %clan_id, %user_id, "clan invitation accepted");
            Ok(())
        })
        .await
    }

    pub async fn reject_invitation(&self, invitation_id: &str, user_id: &str) -> ClanResult<()> {
        let (invitation_id, user_id) = (invitation_id.to_string(), user_id.to_string());
        self.write(move |svc| {
            let mut invitations = svc.invitations.load();
            let invitation =
                answerable(invitations.get_mut(&invitation_id), &user_id, "reject_invitation")?;
            invitation.status = InvitationStatus::Declined;
            invitation.responded_at = Some(Utc::now());
            svc.invitations.save(&invitations)?;

            tracing::info!(%invitation_id, %user_id, "clan invitation declined");
            Ok(())
        })
        .await
    }

    /// Pending invitations addressed to `user_id`, newest first.
    pub async fn pending_invitations_for(&self, user_id: &str) -> ClanResult<Vec<ClanInvitation>> {
        let user_id = user_id.to_string();
        self.blocking(move |svc| {
            let mut pending: Vec<ClanInvitation> = svc
                .invitations
                .load()
                .into_values()
                .filter(|inv| inv.to_user_id == user_id && inv.is_pending())
                .collect();
            pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(pending)
        })
        .await
    }

    pub async fn count_pending_notifications(&self, user_id: &str) -> ClanResult<usize> {
        let user_id = user_id.to_string();
        self.blocking(move |svc| {
            Ok(svc
                .invitations
                .load()
                .values()
                .filter(|inv| inv.to_user_id == user_id && inv.is_pending())
                .count())
        })
        .await
    }
}

/// Only the named recipient may answer, and only while the invitation is
/// pending.
fn answerable<'a>(
    invitation: Option<&'a mut ClanInvitation>,
    user_id: &str,
    op: &'static str,
) -> ClanResult<&'a mut ClanInvitation> {
    let invitation = invitation.ok_or_else(|| rejected(op, ClanError::NotFound("Invitation")))?;
    if invitation.to_user_id != user_id {
        return Err(rejected(
            op,
            ClanError::Unauthorized("This invitation is addressed to someone else"),
        ));
    }
    if !invitation.is_pending() {
        return Err(rejected(
            op,
            ClanError::InvalidState("This invitation was already answered"),
        ));
    }
    Ok(invitation)
}
