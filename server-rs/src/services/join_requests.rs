use chrono::Utc;

use super::clans::{new_id, rejected, ClanService};
use crate::error::{ClanError, ClanResult};
use crate::models::{Clan, ClanJoinRequest, JoinRequestStatus};
use crate::services::membership;
use crate::store::Records;

impl ClanService {
    pub async fn create_join_request(
        &self,
        clan_id: &str,
        from_user_id: &str,
        from_username: &str,
    ) -> ClanResult<ClanJoinRequest> {
        let (clan_id, from_user_id, from_username) =
            (clan_id.to_string(), from_user_id.to_string(), from_username.to_string());
        self.write(move |svc| {
            let clans = svc.clans.load();
            let clan = clans
                .get(&clan_id)
                .ok_or_else(|| rejected("create_join_request", ClanError::NotFound("Clan")))?;

            if membership::is_in_any_clan(&clans, &from_user_id) {
                return Err(rejected(
                    "create_join_request",
                    ClanError::Conflict("You already belong to a clan"),
                ));
            }

            let mut requests = svc.join_requests.load();
            // Same-clan duplicates are always refused; requests to other clans
            // only when the exclusive policy is on.
            let exclusive = svc.policy.exclusive_join_requests;
            if requests.values().any(|req| {
                req.from_user_id == from_user_id
                    && req.is_pending()
                    && (exclusive || req.clan_id == clan_id)
            }) {
                return Err(rejected(
                    "create_join_request",
                    ClanError::Conflict("You already have a pending request"),
                ));
            }

            let request = ClanJoinRequest {
                id: new_id("join-req"),
                clan_id: clan.id.clone(),
                clan_name: clan.name.clone(),
                from_user_id,
                from_username,
                status: JoinRequestStatus::Pending,
                created_at: Utc::now(),
            };
            requests.insert(request.id.clone(), request.clone());
            svc.join_requests.save(&requests)?;

            tracing::info!(
                request_id = %request.id,
                clan_id = %request.clan_id,
                from_user_id = %request.from_user_id,
                "join request created"
            );
            Ok(request)
        })
        .await
    }

    pub async fn accept_join_request(&self, request_id: &str, leader_id: &str) -> ClanResult<()> {
        let (request_id, leader_id) = (request_id.to_string(), leader_id.to_string());
        self.write(move |svc| {
            let mut requests = svc.join_requests.load();
            let clans = svc.clans.load();
            let request = resolvable(
                requests.get_mut(&request_id),
                &clans,
                &leader_id,
                "accept_join_request",
            )?;

            if membership::is_in_any_clan(&clans, &request.from_user_id) {
                return Err(rejected(
                    "accept_join_request",
                    ClanError::Conflict("That user already belongs to a clan"),
                ));
            }
            let mut updated = clans.clone();
            if let Some(clan) = updated.get_mut(&request.clan_id) {
                clan.member_ids.push(request.from_user_id.clone());
            }
            request.status = JoinRequestStatus::Accepted;
            let (clan_id, member_id) = (request.clan_id.clone(), request.from_user_id.clone());

            svc.save_clans_then(&clans, &updated, || svc.join_requests.save(&requests))?;

            tracing::info!(%request_id, %clan_id, %member_id, "join request accepted");
            Ok(())
        })
        .await
    }

    pub async fn reject_join_request(&self, request_id: &str, leader_id: &str) -> ClanResult<()> {
        let (request_id, leader_id) = (request_id.to_string(), leader_id.to_string());
        self.write(move |svc| {
            let mut requests = svc.join_requests.load();
            let clans = svc.clans.load();
            let request = resolvable(
                requests.get_mut(&request_id),
                &clans,
                &leader_id,
                "reject_join_request",
            )?;
            request.status = JoinRequestStatus::Rejected;
            svc.join_requests.save(&requests)?;

            tracing::info!(%request_id, %leader_id, "join request rejected");
            Ok(())
        })
        .await
    }

    /// Pending requests for `clan_id`, oldest first.
    pub async fn pending_join_requests_for(&self, clan_id: &str) -> ClanResult<Vec<ClanJoinRequest>> {
        let clan_id = clan_id.to_string();
        self.blocking(move |svc| {
            let mut pending: Vec<ClanJoinRequest> = svc
                .join_requests
                .load()
                .into_values()
                .filter(|req| req.clan_id == clan_id && req.is_pending())
                .collect();
            pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(pending)
        })
        .await
    }
}

/// A request can be resolved while pending, by the leader of its clan only.
fn resolvable<'a>(
    request: Option<&'a mut ClanJoinRequest>,
    clans: &Records<Clan>,
    leader_id: &str,
    op: &'static str,
) -> ClanResult<&'a mut ClanJoinRequest> {
    let request = request.ok_or_else(|| rejected(op, ClanError::NotFound("Join request")))?;
    if !request.is_pending() {
        return Err(rejected(
            op,
            ClanError::InvalidState("This request was already resolved"),
        ));
    }
    let clan = clans
        .get(&request.clan_id)
        .ok_or_else(|| rejected(op, ClanError::NotFound("Clan")))?;
    if !clan.is_leader(leader_id) {
        return Err(rejected(
            op,
            ClanError::Unauthorized("Only the clan leader can answer join requests"),
        ));
    }
    Ok(request)
}
