//! In-memory [`PersistenceGateway`].
//!
//! Records are stored as bytes produced by a [`Codec`], one table per
//! aggregate, keyed by player. Insert and update keep their storage
//! meaning: inserting over an existing record is a conflict, updating a
//! missing one is not found.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use warden_session::{GatewayError, PersistenceGateway};
use warden_types::{
    Codec, InventorySnapshot, JsonCodec, LoginLocation, PlayerProfile, ProfileRecord, UserId,
};

/// Which gateway method was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    FindProfile,
    InsertProfile,
    UpdateProfile,
    InsertLocation,
    UpdateLocation,
    InsertInventory,
    UpdateInventory,
}

/// One recorded gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GatewayCall {
    pub kind: CallKind,
    pub user_id: UserId,
}

impl GatewayCall {
    pub fn new(kind: CallKind, user_id: UserId) -> Self {
        Self { kind, user_id }
    }
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<UserId, Vec<u8>>,
    locations: HashMap<UserId, Vec<u8>>,
    inventories: HashMap<UserId, Vec<u8>>,
}

struct Inner<C> {
    codec: C,
    tables: RwLock<Tables>,
    calls: Mutex<Vec<GatewayCall>>,
    faults: Mutex<HashMap<CallKind, GatewayError>>,
    latency: Mutex<Option<Duration>>,
}

/// A [`PersistenceGateway`] backed by in-process maps.
///
/// Cheap to clone; clones share the same tables and call log.
///
/// ```rust
/// use warden_session::PersistenceGateway;
/// use warden_store::{CallKind, MemoryGateway};
/// use warden_types::{PlayerProfile, UserId};
///
/// let store = MemoryGateway::new();
/// let id = UserId::from_u128(1);
///
/// store.insert_profile(&PlayerProfile::blank(id, "Alex")).unwrap();
/// let loaded = store.find_profile(id).unwrap().unwrap();
///
/// assert_eq!(loaded.last_name(), "Alex");
/// assert_eq!(store.count(CallKind::InsertProfile), 1);
/// ```
pub struct MemoryGateway<C: Codec = JsonCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: Codec> Clone for MemoryGateway<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// An empty store using [`JsonCodec`].
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl<C: Codec> MemoryGateway<C> {
    pub fn with_codec(codec: C) -> Self {
        Self::build(codec)
    }

    /// Builder-style [`set_latency`](Self::set_latency).
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    /// Makes every call sleep for `latency` before doing anything.
    /// Shared by all clones.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.inner.latency) = latency;
    }

    fn build(codec: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                codec,
                tables: RwLock::new(Tables::default()),
                calls: Mutex::new(Vec::new()),
                faults: Mutex::new(HashMap::new()),
                latency: Mutex::new(None),
            }),
        }
    }

    // -- Test helpers -----------------------------------------------------

    /// Stores every part of `profile` directly, as if it had been saved
    /// earlier. Not recorded in the call log.
    pub fn seed(&self, profile: &PlayerProfile) -> Result<(), GatewayError> {
        let codec = &self.inner.codec;
        let user_id = profile.user_id();
        let record = codec.encode(profile.record().get())?;
        let location = profile
            .location()
            .map(|l| codec.encode(l.get()))
            .transpose()?;
        let inventory = profile
            .inventory()
            .map(|i| codec.encode(i.get()))
            .transpose()?;

        let mut tables = write(&self.inner.tables);
        tables.profiles.insert(user_id, record);
        if let Some(bytes) = location {
            tables.locations.insert(user_id, bytes);
        }
        if let Some(bytes) = inventory {
            tables.inventories.insert(user_id, bytes);
        }
        Ok(())
    }

    /// Reads a profile without logging the call or honoring faults.
    pub fn stored(&self, user_id: UserId) -> Result<Option<PlayerProfile>, GatewayError> {
        self.load(user_id)
    }

    /// Makes every future call of `kind` fail with `error`.
    pub fn fail_on(&self, kind: CallKind, error: GatewayError) {
        lock(&self.inner.faults).insert(kind, error);
    }

    pub fn clear_faults(&self) {
        lock(&self.inner.faults).clear();
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.inner.calls).clone()
    }

    /// How many calls of `kind` were received.
    pub fn count(&self, kind: CallKind) -> usize {
        lock(&self.inner.calls)
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    // -- Internals --------------------------------------------------------

    /// Logs the call, waits out the latency, then applies any fault.
    fn enter(&self, kind: CallKind, user_id: UserId) -> Result<(), GatewayError> {
        lock(&self.inner.calls).push(GatewayCall::new(kind, user_id));
        let latency = *lock(&self.inner.latency);
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        if let Some(error) = lock(&self.inner.faults).get(&kind) {
            tracing::debug!(%user_id, ?kind, %error, "injected storage fault");
            return Err(error.clone());
        }
        Ok(())
    }

    fn load(&self, user_id: UserId) -> Result<Option<PlayerProfile>, GatewayError> {
        let codec = &self.inner.codec;
        let tables = read(&self.inner.tables);
        let Some(bytes) = tables.profiles.get(&user_id) else {
            return Ok(None);
        };
        let record: ProfileRecord = codec.decode(bytes)?;
        let location: Option<LoginLocation> = tables
            .locations
            .get(&user_id)
            .map(|b| codec.decode(b))
            .transpose()?;
        let inventory: Option<InventorySnapshot> = tables
            .inventories
            .get(&user_id)
            .map(|b| codec.decode(b))
            .transpose()?;
        Ok(Some(PlayerProfile::loaded(
            user_id, record, location, inventory,
        )))
    }

    fn insert(
        &self,
        table: fn(&mut Tables) -> &mut HashMap<UserId, Vec<u8>>,
        user_id: UserId,
        bytes: Vec<u8>,
    ) -> Result<(), GatewayError> {
        let mut tables = write(&self.inner.tables);
        let rows = table(&mut *tables);
        if rows.contains_key(&user_id) {
            return Err(GatewayError::Conflict(user_id));
        }
        rows.insert(user_id, bytes);
        Ok(())
    }

    fn update(
        &self,
        table: fn(&mut Tables) -> &mut HashMap<UserId, Vec<u8>>,
        user_id: UserId,
        bytes: Vec<u8>,
    ) -> Result<(), GatewayError> {
        let mut tables = write(&self.inner.tables);
        match table(&mut *tables).get_mut(&user_id) {
            Some(row) => {
                *row = bytes;
                Ok(())
            }
            None => Err(GatewayError::NotFound(user_id)),
        }
    }
}

impl<C: Codec> PersistenceGateway for MemoryGateway<C> {
    fn find_profile(&self, user_id: UserId) -> Result<Option<PlayerProfile>, GatewayError> {
        self.enter(CallKind::FindProfile, user_id)?;
        self.load(user_id)
    }

    fn insert_profile(&self, profile: &PlayerProfile) -> Result<(), GatewayError> {
        let user_id = profile.user_id();
        self.enter(CallKind::InsertProfile, user_id)?;
        let bytes = self.inner.codec.encode(profile.record().get())?;
        self.insert(|t| &mut t.profiles, user_id, bytes)
    }

    fn update_profile(&self, profile: &PlayerProfile) -> Result<(), GatewayError> {
        let user_id = profile.user_id();
        self.enter(CallKind::UpdateProfile, user_id)?;
        let bytes = self.inner.codec.encode(profile.record().get())?;
        self.update(|t| &mut t.profiles, user_id, bytes)
    }

    fn insert_location(
        &self,
        user_id: UserId,
        location: &LoginLocation,
    ) -> Result<(), GatewayError> {
        self.enter(CallKind::InsertLocation, user_id)?;
        let bytes = self.inner.codec.encode(location)?;
        self.insert(|t| &mut t.locations, user_id, bytes)
    }

    fn update_location(
        &self,
        user_id: UserId,
        location: &LoginLocation,
    ) -> Result<(), GatewayError> {
        self.enter(CallKind::UpdateLocation, user_id)?;
        let bytes = self.inner.codec.encode(location)?;
        self.update(|t| &mut t.locations, user_id, bytes)
    }

    fn insert_inventory(
        &self,
        user_id: UserId,
        inventory: &InventorySnapshot,
    ) -> Result<(), GatewayError> {
        self.enter(CallKind::InsertInventory, user_id)?;
        let bytes = self.inner.codec.encode(inventory)?;
        self.insert(|t| &mut t.inventories, user_id, bytes)
    }

    fn update_inventory(
        &self,
        user_id: UserId,
        inventory: &InventorySnapshot,
    ) -> Result<(), GatewayError> {
        self.enter(CallKind::UpdateInventory, user_id)?;
        let bytes = self.inner.codec.encode(inventory)?;
        self.update(|t| &mut t.inventories, user_id, bytes)
    }
}

// A panic while holding one of these locks leaves plain data behind, so
// poisoning is ignored.

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
