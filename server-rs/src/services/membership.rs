use crate::models::Clan;
use crate::store::Records;

/// The clan `user_id` belongs to, as leader or member.
///
/// Single source of truth for the one-clan-per-user rule; every operation that
/// admits a member checks this first.
pub fn find_clan_by_user<'a>(clans: &'a Records<Clan>, user_id: &str) -> Option<&'a Clan> {
    clans.values().find(|clan| clan.has_member(user_id))
}

pub fn is_in_any_clan(clans: &Records<Clan>, user_id: &str) -> bool {
    find_clan_by_user(clans, user_id).is_some()
}

/// Case-insensitive clash on either name or tag.
pub fn name_or_tag_taken(clans: &Records<Clan>, name: &str, tag: &str) -> bool {
    let name = name.to_lowercase();
    let tag = tag.to_lowercase();
    clans
        .values()
        .any(|clan| clan.name.to_lowercase() == name || clan.tag.to_lowercase() == tag)
}
