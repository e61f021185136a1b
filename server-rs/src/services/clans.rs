use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{ClanPolicyConfig, Config, StorageBackend};
use crate::error::{ClanError, ClanResult};
use crate::models::{Clan, ClanInvitation, ClanJoinRequest, PurgeReport};
use crate::services::membership;
use crate::store::{JsonFileStore, MemoryStore, RecordStore, Records, StoreError};

/// Clan lifecycle, invitations and join requests over three record stores.
///
/// Store access runs on the blocking pool. Mutations also hold `write_lock`
/// for the whole load-change-save cycle, so each one sees the result of the
/// previous one. Reads skip the lock.
#[derive(Clone)]
pub struct ClanService {
    pub(super) clans: Arc<dyn RecordStore<Clan>>,
    pub(super) invitations: Arc<dyn RecordStore<ClanInvitation>>,
    pub(super) join_requests: Arc<dyn RecordStore<ClanJoinRequest>>,
    pub(super) policy: ClanPolicyConfig,
    write_lock: Arc<Mutex<()>>,
}

pub(super) fn rejected(op: &'static str, err: ClanError) -> ClanError {
    tracing::debug!(op, reason = %err, "clan operation rejected");
    err
}

pub(super) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

impl ClanService {
    pub fn new(
        clans: Arc<dyn RecordStore<Clan>>,
        invitations: Arc<dyn RecordStore<ClanInvitation>>,
        join_requests: Arc<dyn RecordStore<ClanJoinRequest>>,
        policy: ClanPolicyConfig,
    ) -> Self {
        Self {
            clans,
            invitations,
            join_requests,
            policy,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory(policy: ClanPolicyConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            policy,
        )
    }

    pub fn from_config(config: &Config) -> Self {
        match config.storage.backend {
            StorageBackend::Memory => Self::in_memory(config.clans.clone()),
            StorageBackend::File => Self::new(
                Arc::new(JsonFileStore::new(config.clans_file())),
                Arc::new(JsonFileStore::new(config.invitations_file())),
                Arc::new(JsonFileStore::new(config.join_requests_file())),
                config.clans.clone(),
            ),
        }
    }

    pub fn policy(&self) -> &ClanPolicyConfig {
        &self.policy
    }

    /// Runs `op` on the blocking pool.
    pub(super) async fn blocking<T, F>(&self, op: F) -> ClanResult<T>
    where
        F: FnOnce(&ClanService) -> ClanResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let svc = self.clone();
        tokio::task::spawn_blocking(move || op(&svc))
            .await
            .map_err(|e| ClanError::Storage(StoreError::Worker(e.to_string())))?
    }

    /// Runs `op` on the blocking pool under the write lock. The guard moves
    /// into the task, so a dropped request cannot release the lock while its
    /// write is still in flight.
    pub(super) async fn write<T, F>(&self, op: F) -> ClanResult<T>
    where
        F: FnOnce(&ClanService) -> ClanResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.write_lock.clone().lock_owned().await;
        self.blocking(move |svc| {
            let _guard = guard;
            op(svc)
        })
        .await
    }

    /// Saves `after` to the clan store, then runs `then`. If `then` fails the
    /// clan store is put back to `before`, so neither write sticks.
    pub(super) fn save_clans_then(
        &self,
        before: &Records<Clan>,
        after: &Records<Clan>,
        then: impl FnOnce() -> Result<(), StoreError>,
    ) -> ClanResult<()> {
        self.clans.save(after)?;
        if let Err(e) = then() {
            if let Err(rollback) = self.clans.save(before) {
                tracing::error!(error = %rollback, "clan store rollback failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn list_clans(&self) -> ClanResult<Vec<Clan>> {
        self.blocking(|svc| {
            let mut clans: Vec<Clan> = svc.clans.load().into_values().collect();
            clans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            Ok(clans)
        })
        .await
    }

    pub async fn get_clan(&self, clan_id: &str) -> ClanResult<Clan> {
        let clan_id = clan_id.to_string();
        self.blocking(move |svc| {
            svc.clans
                .load()
                .remove(&clan_id)
                .ok_or(ClanError::NotFound("Clan"))
        })
        .await
    }

    pub async fn find_clan_by_user(&self, user_id: &str) -> ClanResult<Option<Clan>> {
        let user_id = user_id.to_string();
        self.blocking(move |svc| {
            Ok(membership::find_clan_by_user(&svc.clans.load(), &user_id).cloned())
        })
        .await
    }

    pub async fn create_clan(
        &self,
        name: &str,
        tag: &str,
        leader_id: &str,
        logo_url: Option<String>,
    ) -> ClanResult<Clan> {
        let (name, tag, leader_id) = (name.to_string(), tag.to_string(), leader_id.to_string());
        self.write(move |svc| {
            let mut clans = svc.clans.load();

            if membership::is_in_any_clan(&clans, &leader_id) {
                return Err(rejected(
                    "create_clan",
                    ClanError::Conflict("You already belong to a clan"),
                ));
            }
            if membership::name_or_tag_taken(&clans, &name, &tag) {
                return Err(rejected(
                    "create_clan",
                    ClanError::Conflict("A clan with that name or tag already exists"),
                ));
            }

            let clan = Clan {
                id: new_id("clan"),
                name,
                tag,
                logo_url,
                leader_id: leader_id.clone(),
                member_ids: vec![leader_id],
                created_at: Utc::now(),
            };
            clans.insert(clan.id.clone(), clan.clone());
            svc.clans.save(&clans)?;

            tracing::info!(
                clan_id = %clan.id,
                leader_id = %clan.leader_id,
                name = %clan.name,
                tag = %clan.tag,
                "clan created"
            );
            Ok(clan)
        })
        .await
    }

    pub async fn delete_clan(&self, clan_id: &str, requester_id: &str) -> ClanResult<()> {
        let (clan_id, requester_id) = (clan_id.to_string(), requester_id.to_string());
        self.write(move |svc| {
            let clans = svc.clans.load();
            let clan = clans
                .get(&clan_id)
                .ok_or_else(|| rejected("delete_clan", ClanError::NotFound("Clan")))?;
            if !clan.is_leader(&requester_id) {
                return Err(rejected(
                    "delete_clan",
                    ClanError::Unauthorized("Only the clan leader can delete the clan"),
                ));
            }
            svc.remove_clan_cascading(&clans, &clan_id)?;

            tracing::info!(%clan_id, %requester_id, "clan deleted");
            Ok(())
        })
        .await
    }

    /// Deletes any clan regardless of who asks. Used by administrators.
    pub async fn admin_delete_clan(&self, clan_id: &str) -> ClanResult<Clan> {
        let clan_id = clan_id.to_string();
        self.write(move |svc| {
            let clans = svc.clans.load();
            let clan = clans
                .get(&clan_id)
                .cloned()
                .ok_or_else(|| rejected("admin_delete_clan", ClanError::NotFound("Clan")))?;
            svc.remove_clan_cascading(&clans, &clan_id)?;

            tracing::info!(%clan_id, leader_id = %clan.leader_id, "clan deleted by admin");
            Ok(clan)
        })
        .await
    }

    /// Drops the clan and its still-pending invitations. Answered invitations
    /// stay in the store as history.
    fn remove_clan_cascading(&self, clans: &Records<Clan>, clan_id: &str) -> ClanResult<()> {
        let mut remaining = clans.clone();
        remaining.remove(clan_id);

        let mut invitations = self.invitations.load();
        let before = invitations.len();
        invitations.retain(|_, inv| !(inv.clan_id == clan_id && inv.is_pending()));
        let dropped = before - invitations.len();

        self.save_clans_then(clans, &remaining, || {
            if dropped > 0 {
                self.invitations.save(&invitations)
            } else {
                Ok(())
            }
        })?;
        if dropped > 0 {
            tracing::debug!(clan_id, dropped, "pending invitations removed with clan");
        }
        Ok(())
    }

    pub async fn update_avatar(
        &self,
        clan_id: &str,
        requester_id: &str,
        logo_url: &str,
    ) -> ClanResult<Clan> {
        let (clan_id, requester_id, logo_url) =
            (clan_id.to_string(), requester_id.to_string(), logo_url.to_string());
        self.write(move |svc| {
            let mut clans = svc.clans.load();
            let clan = clans
                .get_mut(&clan_id)
                .ok_or_else(|| rejected("update_avatar", ClanError::NotFound("Clan")))?;
            if !clan.is_leader(&requester_id) {
                return Err(rejected(
                    "update_avatar",
                    ClanError::Unauthorized("Only the clan leader can change the avatar"),
                ));
            }
            clan.logo_url = Some(logo_url);
            let updated = clan.clone();
            svc.clans.save(&clans)?;

            tracing::info!(%clan_id, %requester_id, "clan avatar updated");
            Ok(updated)
        })
        .await
    }

    pub async fn leave_clan(&self, clan_id: &str, user_id: &str) -> ClanResult<()> {
        let (clan_id, user_id) = (clan_id.to_string(), user_id.to_string());
        self.write(move |svc| {
            let mut clans = svc.clans.load();
            let clan = clans
                .get_mut(&clan_id)
                .ok_or_else(|| rejected("leave_clan", ClanError::NotFound("Clan")))?;
            if clan.is_leader(&user_id) {
                return Err(rejected(
                    "leave_clan",
                    ClanError::InvalidState("The leader cannot leave; delete the clan instead"),
                ));
            }
            let Some(pos) = clan.member_ids.iter().position(|m| *m == user_id) else {
                return Err(rejected(
                    "leave_clan",
                    ClanError::InvalidState("You are not a member of this clan"),
                ));
            };
            clan.member_ids.remove(pos);
            svc.clans.save(&clans)?;

            tracing::info!(%clan_id, %user_id, "member left clan");
            Ok(())
        })
        .await
    }

    pub async fn remove_member(
        &self,
        clan_id: &str,
        member_id: &str,
        requester_id: &str,
    ) -> ClanResult<()> {
        let (clan_id, member_id, requester_id) =
            (clan_id.to_string(), member_id.to_string(), requester_id.to_string());
        self.write(move |svc| {
            let mut clans = svc.clans.load();
            let clan = clans
                .get_mut(&clan_id)
                .ok_or_else(|| rejected("remove_member", ClanError::NotFound("Clan")))?;
            if !clan.is_leader(&requester_id) {
                return Err(rejected(
                    "remove_member",
                    ClanError::Unauthorized("Only the clan leader can remove members"),
                ));
            }
            if clan.is_leader(&member_id) {
                return Err(rejected(
                    "remove_member",
                    ClanError::InvalidState("The leader cannot be removed"),
                ));
            }
            let Some(pos) = clan.member_ids.iter().position(|m| *m == member_id) else {
                return Err(rejected(
                    "remove_member",
                    ClanError::InvalidState("User is not a member of this clan"),
                ));
            };
            clan.member_ids.remove(pos);
            svc.clans.save(&clans)?;

            tracing::info!(%clan_id, %member_id, %requester_id, "member removed from clan");
            Ok(())
        })
        .await
    }

    /// Empties all three stores. Either all of them end up empty or, when a
    /// save fails, the stores already cleared are written back.
    pub async fn purge_all(&self) -> ClanResult<PurgeReport> {
        self.write(|svc| {
            let clans = svc.clans.load();
            let invitations = svc.invitations.load();
            let report = PurgeReport {
                clans_deleted: clans.len(),
                invitations_deleted: invitations.len(),
                join_requests_deleted: svc.join_requests.load().len(),
            };

            svc.save_clans_then(&clans, &Records::new(), || {
                svc.invitations.save(&Records::new())?;
                if let Err(e) = svc.join_requests.save(&Records::new()) {
                    if let Err(rollback) = svc.invitations.save(&invitations) {
                        tracing::error!(error = %rollback, "invitation store rollback failed");
                    }
                    return Err(e);
                }
                Ok(())
            })?;

            tracing::warn!(
                clans = report.clans_deleted,
                invitations = report.invitations_deleted,
                join_requests = report.join_requests_deleted,
                "all clan data purged"
            );
            Ok(report)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::InvitationStatus;

    pub(crate) fn service() -> ClanService {
        ClanService::in_memory(ClanPolicyConfig::default())
    }

    /// Store that accepts loads but refuses every save.
    pub(crate) struct BrokenStore;

    impl<T> RecordStore<T> for BrokenStore {
        fn load(&self) -> Records<T> {
            Records::new()
        }

        fn save(&self, _records: &Records<T>) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "broken.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
    }

    #[tokio::test]
    async fn create_clan_makes_leader_sole_member() {
        let svc = service();
        let clan = svc.create_clan("Quake Club", "QC", "u1", None).await.unwrap();
        assert_eq!(clan.leader_id, "u1");
        assert_eq!(clan.member_ids, vec!["u1".to_string()]);
        assert!(clan.id.starts_with("clan-"));
        assert_eq!(svc.get_clan(&clan.id).await.unwrap(), clan);
        assert_eq!(svc.find_clan_by_user("u1").await.unwrap().map(|c| c.id), Some(clan.id));
    }

    #[tokio::test]
    async fn create_clan_rejects_case_insensitive_duplicates() {
        let svc = service();
        svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();

        let err = svc.create_clan("alpha", "alp", "u2", None).await.unwrap_err();
        assert!(matches!(err, ClanError::Conflict(_)));
        let err = svc.create_clan("Beta", "alp", "u2", None).await.unwrap_err();
        assert!(matches!(err, ClanError::Conflict(_)));
        assert_eq!(svc.list_clans().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_clan_rejects_user_already_in_clan() {
        let svc = service();
        svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        let err = svc.create_clan("Beta", "BET", "u1", None).await.unwrap_err();
        assert!(matches!(err, ClanError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_clans_is_ordered_by_creation() {
        let svc = service();
        let a = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        let b = svc.create_clan("Beta", "BET", "u2", None).await.unwrap();
        let ids: Vec<_> = svc.list_clans().await.unwrap().into_iter().map(|c| c.id).collect();
        if a.created_at == b.created_at {
            let mut expected = vec![a.id, b.id];
            expected.sort();
            assert_eq!(ids, expected);
        } else {
            assert_eq!(ids, vec![a.id, b.id]);
        }
    }

    #[tokio::test]
    async fn delete_clan_is_leader_only() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();

        let err = svc.delete_clan(&clan.id, "u2").await.unwrap_err();
        assert!(matches!(err, ClanError::Unauthorized(_)));
        let err = svc.delete_clan("clan-missing", "u1").await.unwrap_err();
        assert!(matches!(err, ClanError::NotFound(_)));

        svc.delete_clan(&clan.id, "u1").await.unwrap();
        assert!(svc.get_clan(&clan.id).await.is_err());
        assert!(svc.find_clan_by_user("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_clan_drops_only_pending_invitations() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        let answered = svc
            .create_invitation(&clan.id, "u1", "U1", "u2", "U2")
            .await
            .unwrap();
        svc.reject_invitation(&answered.id, "u2").await.unwrap();
        let pending = svc
            .create_invitation(&clan.id, "u1", "U1", "u3", "U3")
            .await
            .unwrap();

        svc.delete_clan(&clan.id, "u1").await.unwrap();

        let invitations = svc.invitations.load();
        assert!(!invitations.contains_key(&pending.id));
        assert_eq!(
            invitations.get(&answered.id).map(|i| i.status),
            Some(InvitationStatus::Declined)
        );
        let err = svc.accept_invitation(&pending.id, "u3").await.unwrap_err();
        assert!(matches!(err, ClanError::NotFound(_)));
    }

    #[tokio::test]
    async fn admin_delete_ignores_leadership() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        let deleted = svc.admin_delete_clan(&clan.id).await.unwrap();
        assert_eq!(deleted.id, clan.id);
        assert!(svc.list_clans().await.unwrap().is_empty());
        assert!(matches!(
            svc.admin_delete_clan(&clan.id).await.unwrap_err(),
            ClanError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn update_avatar_is_leader_only() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();

        let err = svc
            .update_avatar(&clan.id, "u2", "https://cdn.example/a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, ClanError::Unauthorized(_)));

        let updated = svc
            .update_avatar(&clan.id, "u1", "https://cdn.example/a.png")
            .await
            .unwrap();
        assert_eq!(updated.logo_url.as_deref(), Some("https://cdn.example/a.png"));
        assert_eq!(svc.get_clan(&clan.id).await.unwrap().logo_url, updated.logo_url);
    }

    #[tokio::test]
    async fn leader_cannot_leave_or_be_removed() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();

        assert!(svc.leave_clan(&clan.id, "u1").await.is_err());
        assert!(svc.remove_member(&clan.id, "u1", "u1").await.is_err());
        assert_eq!(svc.get_clan(&clan.id).await.unwrap().member_ids, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn member_can_leave_and_be_removed() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        for user in ["u2", "u3"] {
            let inv = svc
                .create_invitation(&clan.id, "u1", "U1", user, user)
                .await
                .unwrap();
            svc.accept_invitation(&inv.id, user).await.unwrap();
        }

        svc.leave_clan(&clan.id, "u2").await.unwrap();
        assert!(svc.find_clan_by_user("u2").await.unwrap().is_none());
        assert!(svc.leave_clan(&clan.id, "u2").await.is_err());

        let err = svc.remove_member(&clan.id, "u3", "u2").await.unwrap_err();
        assert!(matches!(err, ClanError::Unauthorized(_)));
        svc.remove_member(&clan.id, "u3", "u1").await.unwrap();
        assert!(svc.find_clan_by_user("u3").await.unwrap().is_none());
        assert!(svc.remove_member(&clan.id, "u3", "u1").await.is_err());
        assert_eq!(svc.get_clan(&clan.id).await.unwrap().member_ids, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn purge_all_reports_counts() {
        let svc = service();
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        svc.create_invitation(&clan.id, "u1", "U1", "u2", "U2")
            .await
            .unwrap();
        svc.create_join_request(&clan.id, "u3", "U3").await.unwrap();

        let report = svc.purge_all().await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                clans_deleted: 1,
                invitations_deleted: 1,
                join_requests_deleted: 1,
            }
        );
        assert!(svc.list_clans().await.unwrap().is_empty());
        assert!(svc.pending_invitations_for("u2").await.unwrap().is_empty());
    }

    fn file_service(dir: &std::path::Path) -> ClanService {
        ClanService::new(
            Arc::new(JsonFileStore::new(dir.join("clans.json"))),
            Arc::new(JsonFileStore::new(dir.join("clan-invitations.json"))),
            Arc::new(JsonFileStore::new(dir.join("clan-join-requests.json"))),
            ClanPolicyConfig::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_backed_writes_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let svc = file_service(dir.path());
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        let inv = svc
            .create_invitation(&clan.id, "u1", "U1", "u2", "U2")
            .await
            .unwrap();
        svc.accept_invitation(&inv.id, "u2").await.unwrap();

        let reopened = file_service(dir.path());
        let stored = reopened.get_clan(&clan.id).await.unwrap();
        assert_eq!(stored.member_ids, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(reopened.count_pending_notifications("u2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_purge_keeps_clans() {
        let clans: Arc<MemoryStore<Clan>> = Arc::new(MemoryStore::new());
        let svc = ClanService::new(
            clans.clone(),
            Arc::new(BrokenStore),
            Arc::new(MemoryStore::new()),
            ClanPolicyConfig::default(),
        );
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();

        let err = svc.purge_all().await.unwrap_err();
        assert!(matches!(err, ClanError::Storage(_)));
        assert_eq!(clans.load().len(), 1);
        assert_eq!(svc.get_clan(&clan.id).await.unwrap(), clan);
    }

    #[tokio::test]
    async fn failed_purge_restores_invitations_too() {
        let clans: Arc<MemoryStore<Clan>> = Arc::new(MemoryStore::new());
        let invitations: Arc<MemoryStore<ClanInvitation>> = Arc::new(MemoryStore::new());
        let svc = ClanService::new(
            clans.clone(),
            invitations.clone(),
            Arc::new(BrokenStore),
            ClanPolicyConfig::default(),
        );
        let clan = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap();
        let inv = svc
            .create_invitation(&clan.id, "u1", "U1", "u2", "U2")
            .await
            .unwrap();

        assert!(svc.purge_all().await.is_err());
        assert_eq!(clans.load().len(), 1);
        assert!(invitations.load().contains_key(&inv.id));
        assert_eq!(svc.count_pending_notifications("u2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_storage_error() {
        let svc = ClanService::new(
            Arc::new(BrokenStore),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            ClanPolicyConfig::default(),
        );
        let err = svc.create_clan("Alpha", "ALP", "u1", None).await.unwrap_err();
        assert!(matches!(err, ClanError::Storage(_)));
    }
}
