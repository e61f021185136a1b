pub mod admin;
pub mod clans;
pub mod health;
pub mod invitations;
pub mod join_requests;
pub mod notifications;
