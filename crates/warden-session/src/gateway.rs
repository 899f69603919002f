//! The persistence contract the session core consumes.
//!
//! Warden doesn't talk to a database itself. Whatever backs it (SQL,
//! a key-value store, the in-memory `warden-store` crate in tests)
//! implements [`PersistenceGateway`], and the session decides *which*
//! calls to make from the lifecycle tags on the profile.
//!
//! Every method is synchronous and may block. The coordinator only calls
//! them from the [`WorkerPool`](crate::WorkerPool); the synchronous
//! session methods call them inline.

use warden_types::{InventorySnapshot, LoginLocation, PlayerProfile, UserId};

use crate::GatewayError;

/// Synchronous insert/update operations per aggregate, keyed by the
/// player's durable identity.
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Looks up the stored profile. `Ok(None)` means the player has never
    /// registered.
    fn find_profile(&self, user_id: UserId) -> Result<Option<PlayerProfile>, GatewayError>;

    /// Stores a new profile record. Called by registration actions, never
    /// by the save path.
    fn insert_profile(&self, profile: &PlayerProfile) -> Result<(), GatewayError>;

    /// Overwrites the stored profile record.
    fn update_profile(&self, profile: &PlayerProfile) -> Result<(), GatewayError>;

    fn insert_location(
        &self,
        user_id: UserId,
        location: &LoginLocation,
    ) -> Result<(), GatewayError>;

    fn update_location(
        &self,
        user_id: UserId,
        location: &LoginLocation,
    ) -> Result<(), GatewayError>;

    fn insert_inventory(
        &self,
        user_id: UserId,
        inventory: &InventorySnapshot,
    ) -> Result<(), GatewayError>;

    fn update_inventory(
        &self,
        user_id: UserId,
        inventory: &InventorySnapshot,
    ) -> Result<(), GatewayError>;
}
