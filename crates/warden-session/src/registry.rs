//! Where blank profiles come from.
//!
//! Session creation and eviction belong to the host. The one thing the
//! session core needs from it is a way to mint a fresh, unregistered
//! profile when [`PlayerSession::reset_profile`](crate::PlayerSession::reset_profile)
//! throws the current one away.

use warden_types::{PlayerProfile, UserId};

/// Supplies blank profiles for a player.
pub trait SessionRegistry: Send + Sync + 'static {
    /// A profile that has never been stored, for `user_id`. `last_name`
    /// is the display name the player is currently known by.
    fn create_blank_profile(&self, user_id: UserId, last_name: &str) -> PlayerProfile;
}

/// Hands out [`PlayerProfile::blank`] with no extra defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankProfiles;

impl SessionRegistry for BlankProfiles {
    fn create_blank_profile(&self, user_id: UserId, last_name: &str) -> PlayerProfile {
        PlayerProfile::blank(user_id, last_name)
    }
}
