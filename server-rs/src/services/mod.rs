pub mod clans;
pub mod invitations;
pub mod join_requests;
pub mod membership;

pub use clans::ClanService;

#[cfg(test)]
mod tests {
    use super::clans::tests::service;
    use super::ClanService;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    const USERS: [&str; 6] = ["u1", "u2", "u3", "u4", "u5", "u6"];

    async fn assert_single_clan(svc: &ClanService) {
        let mut seen: HashMap<String, String> = HashMap::new();
        for clan in svc.list_clans().await.unwrap() {
            assert!(clan.member_ids.contains(&clan.leader_id));
            let mut ids = clan.member_ids.clone();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), clan.member_ids.len(), "duplicate member in {}", clan.id);
            for member in &clan.member_ids {
                if let Some(other) = seen.insert(member.clone(), clan.id.clone()) {
                    panic!("{member} is in both {other} and {}", clan.id);
                }
            }
        }
    }

    #[tokio::test]
    async fn random_operation_sequences_keep_one_clan_per_user() {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let svc = service();

            for step in 0..200 {
                let user = *USERS.choose(&mut rng).unwrap();
                let other = *USERS.choose(&mut rng).unwrap();
                let clans = svc.list_clans().await.unwrap();
                let clan_id = clans.choose(&mut rng).map(|c| c.id.clone());

                match rng.gen_range(0..9) {
                    0 => {
                        let n = rng.gen_range(0..4);
                        let _ = svc
                            .create_clan(&format!("Clan {n}"), &format!("C{n}"), user, None)
                            .await;
                    }
                    1 => {
                        if let Some(id) = &clan_id {
                            let _ = svc.create_invitation(id, user, user, other, other).await;
                        }
                    }
                    2 => {
                        let invites: Vec<_> = svc
                            .pending_invitations_for(other)
                            .await
                            .unwrap()
                            .into_iter()
                            .map(|inv| inv.id)
                            .collect();
                        if let Some(id) = invites.choose(&mut rng) {
                            let _ = svc.accept_invitation(id, other).await;
                        }
                    }
                    3 => {
                        if let Some(id) = &clan_id {
                            let _ = svc.create_join_request(id, user, user).await;
                        }
                    }
                    4 => {
                        if let Some(id) = &clan_id {
                            let leader = svc
                                .get_clan(id)
                                .await
                                .map(|c| c.leader_id)
                                .unwrap_or_default();
                            let pending = svc.pending_join_requests_for(id).await.unwrap();
                            if let Some(req) = pending.choose(&mut rng) {
                                let _ = svc.accept_join_request(&req.id, &leader).await;
                            }
                        }
                    }
                    5 => {
                        if let Some(id) = &clan_id {
                            let _ = svc.leave_clan(id, user).await;
                        }
                    }
                    6 => {
                        if let Some(id) = &clan_id {
                            let _ = svc.remove_member(id, other, user).await;
                        }
                    }
                    7 => {
                        if let Some(id) = &clan_id {
                            let _ = svc.delete_clan(id, user).await;
                        }
                    }
                    _ => {
                        if let Some(id) = &clan_id {
                            let leader = svc
                                .get_clan(id)
                                .await
                                .map(|c| c.leader_id)
                                .unwrap_or_default();
                            let _ = svc.remove_member(id, &leader, &leader).await;
                            let _ = svc.leave_clan(id, &leader).await;
                            assert!(
                                svc.get_clan(id).await.unwrap().has_member(&leader),
                                "seed {seed} step {step}: leader left {id}"
                            );
                        }
                    }
                }

                assert_single_clan(&svc).await;
            }
        }
    }

    #[tokio::test]
    async fn concurrent_accepts_admit_user_once() {
        let svc = service();
        let qc = svc.create_clan("Quake Club", "QC", "u1", None).await.unwrap();
        let inv = svc
            .create_invitation(&qc.id, "u1", "U1", "u2", "U2")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            let id = inv.id.clone();
            handles.push(tokio::spawn(async move {
                svc.accept_invitation(&id, "u2").await.is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(
            svc.get_clan(&qc.id).await.unwrap().member_ids,
            vec!["u1".to_string(), "u2".to_string()]
        );
    }

    #[tokio::test]
    async fn concurrent_join_request_accepts_respect_single_clan() {
        let svc = service();
        let qc = svc.create_clan("Quake Club", "QC", "u1", None).await.unwrap();
        let rm = svc.create_clan("Rail Masters", "RM", "u5", None).await.unwrap();
        let a = svc.create_join_request(&qc.id, "u3", "U3").await.unwrap();
        let b = svc.create_join_request(&rm.id, "u3", "U3").await.unwrap();

        let (first, second) = tokio::join!(
            svc.accept_join_request(&a.id, "u1"),
            svc.accept_join_request(&b.id, "u5"),
        );
        assert!(first.is_ok() ^ second.is_ok());
        assert_single_clan(&svc).await;
    }
}
