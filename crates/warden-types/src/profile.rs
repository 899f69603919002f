//! The player profile and its sub-aggregates.
//!
//! A profile is the durable record a session wraps. It is made of three
//! independently persisted pieces, each with its own [`Lifecycle`] tag:
//!
//! - the profile record itself ([`ProfileRecord`]),
//! - an optional [`LoginLocation`] (where the player logged out),
//! - an optional [`InventorySnapshot`] (what they were carrying).
//!
//! Sessions never merge profiles: refreshing, resetting, or committing an
//! action replaces the whole value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Lifecycle, Tracked, UserId};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A stored secret. Its presence on a profile means the player is registered.
///
/// Warden never hashes or verifies secrets itself; `algorithm` is an
/// opaque id for whatever scheme produced `secret`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub secret: String,
    pub algorithm: u32,
}

impl Credential {
    pub fn new(secret: impl Into<String>, algorithm: u32) -> Self {
        Self {
            secret: secret.into(),
            algorithm,
        }
    }
}

// Secrets must not end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Sub-aggregates
// ---------------------------------------------------------------------------

/// Where a player was when their location was last captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginLocation {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl LoginLocation {
    /// A location facing straight ahead (yaw and pitch 0).
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

/// Serialized item stacks a player carried. Empty slots are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub contents: Vec<Option<String>>,
    /// Boots, leggings, chestplate, helmet.
    pub armor: [Option<String>; 4],
    pub offhand: Option<String>,
}

// ---------------------------------------------------------------------------
// ProfileRecord
// ---------------------------------------------------------------------------

/// The profile-level fields, persisted as one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Display name the player last joined with.
    pub last_name: String,
    pub ip_address: Option<String>,
    pub credential: Option<Credential>,
    /// Unix seconds.
    pub registered_at: Option<u64>,
    /// Unix seconds.
    pub last_login: Option<u64>,
}

// ---------------------------------------------------------------------------
// PlayerProfile
// ---------------------------------------------------------------------------

/// Durable identity, credential, and state for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    user_id: UserId,
    record: Tracked<ProfileRecord>,
    location: Option<Tracked<LoginLocation>>,
    inventory: Option<Tracked<InventorySnapshot>>,
}

impl PlayerProfile {
    /// A profile that has never been stored: no credential, no
    /// sub-aggregates, record tagged `New`.
    pub fn blank(user_id: UserId, last_name: impl Into<String>) -> Self {
        Self {
            user_id,
            record: Tracked::new(ProfileRecord {
                last_name: last_name.into(),
                ..ProfileRecord::default()
            }),
            location: None,
            inventory: None,
        }
    }

    /// Assembles a profile from values just read from storage. Every tag
    /// is `Unchanged`.
    pub fn loaded(
        user_id: UserId,
        record: ProfileRecord,
        location: Option<LoginLocation>,
        inventory: Option<InventorySnapshot>,
    ) -> Self {
        Self {
            user_id,
            record: Tracked::loaded(record),
            location: location.map(Tracked::loaded),
            inventory: inventory.map(Tracked::loaded),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn last_name(&self) -> &str {
        &self.record.last_name
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.record.ip_address.as_deref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.record.credential.as_ref()
    }

    pub fn registered_at(&self) -> Option<u64> {
        self.record.registered_at
    }

    pub fn last_login(&self) -> Option<u64> {
        self.record.last_login
    }

    /// `true` when a credential is present.
    pub fn is_registered(&self) -> bool {
        self.record.credential.is_some()
    }

    /// Lifecycle tag of the profile record itself (not its sub-aggregates).
    pub fn lifecycle(&self) -> Lifecycle {
        self.record.lifecycle()
    }

    pub fn record(&self) -> &Tracked<ProfileRecord> {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Tracked<ProfileRecord> {
        &mut self.record
    }

    pub fn location(&self) -> Option<&Tracked<LoginLocation>> {
        self.location.as_ref()
    }

    pub fn location_mut(&mut self) -> Option<&mut Tracked<LoginLocation>> {
        self.location.as_mut()
    }

    pub fn inventory(&self) -> Option<&Tracked<InventorySnapshot>> {
        self.inventory.as_ref()
    }

    pub fn inventory_mut(&mut self) -> Option<&mut Tracked<InventorySnapshot>> {
        self.inventory.as_mut()
    }

    /// Edits the profile record and marks it dirty.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut ProfileRecord) -> R) -> R {
        self.record.edit(f)
    }

    pub fn set_last_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.edit(|r| r.last_name = name);
    }

    pub fn set_ip_address(&mut self, ip: Option<String>) {
        self.edit(|r| r.ip_address = ip);
    }

    /// Sets or clears the credential. Clearing it unregisters the player.
    pub fn set_credential(&mut self, credential: Option<Credential>) {
        self.edit(|r| r.credential = credential);
    }

    pub fn set_registered_at(&mut self, at: u64) {
        self.edit(|r| r.registered_at = Some(at));
    }

    pub fn set_last_login(&mut self, at: u64) {
        self.edit(|r| r.last_login = Some(at));
    }

    /// Stores a login location: a first location is `New`, a replacement
    /// marks the existing one `Changed`.
    pub fn set_location(&mut self, location: LoginLocation) {
        match &mut self.location {
            Some(tracked) => tracked.replace(location),
            None => self.location = Some(Tracked::new(location)),
        }
    }

    /// Stores an inventory snapshot. Same tagging rules as
    /// [`set_location`](Self::set_location).
    pub fn set_inventory(&mut self, inventory: InventorySnapshot) {
        match &mut self.inventory {
            Some(tracked) => tracked.replace(inventory),
            None => self.inventory = Some(Tracked::new(inventory)),
        }
    }

    /// `true` if the record or any present sub-aggregate is not `Unchanged`.
    pub fn is_dirty(&self) -> bool {
        self.record.lifecycle() != Lifecycle::Unchanged
            || self
                .location
                .as_ref()
                .is_some_and(|l| l.lifecycle() != Lifecycle::Unchanged)
            || self
                .inventory
                .as_ref()
                .is_some_and(|i| i.lifecycle() != Lifecycle::Unchanged)
    }
}
