//! `Warden` builder and the join/leave entry points.
//!
//! This is what a game server embeds. It ties the layers together:
//! storage, then session services, then the coordinator.

use std::sync::Arc;

use warden_session::{
    spawn_coordinator, spawn_coordinator_with_pool, AuthListener, BlankProfiles,
    CoordinatorHandle, NoPeers, PeerLookup, PersistenceGateway, PlayerSession, SessionError,
    SessionRegistry, SessionServices, SubscriberBus, WorkerPool,
};
use warden_types::{AuthMode, PlayerProfile, UserId};

use crate::{WardenConfig, WardenError};

/// Builder for configuring and starting Warden.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use warden::prelude::*;
/// # async fn run(gateway: Arc<dyn PersistenceGateway>) -> Result<(), WardenError> {
/// let warden = Warden::builder()
///     .config(WardenConfig::default())
///     .start(gateway);
///
/// let mode = warden.join(UserId::random(), "Alex").await?;
/// # let _ = mode;
/// # Ok(())
/// # }
/// ```
pub struct WardenBuilder {
    config: WardenConfig,
    events: SubscriberBus,
    registry: Arc<dyn SessionRegistry>,
    peers: Arc<dyn PeerLookup>,
    pool: Option<Arc<dyn WorkerPool>>,
}

impl WardenBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: WardenConfig::default(),
            events: SubscriberBus::new(),
            registry: Arc::new(BlankProfiles),
            peers: Arc::new(NoPeers),
            pool: None,
        }
    }

    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a listener. Listeners are consulted in the order added.
    pub fn listener(mut self, listener: Arc<dyn AuthListener>) -> Self {
        self.events.subscribe(listener);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn peers(mut self, peers: Arc<dyn PeerLookup>) -> Self {
        self.peers = peers;
        self
    }

    /// Replaces the default Tokio blocking pool.
    pub fn pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Spawns the coordinator on the current runtime.
    ///
    /// # Panics
    /// If called outside a Tokio runtime.
    pub fn start(self, gateway: Arc<dyn PersistenceGateway>) -> Warden {
        let config = self.config.validated();
        let services = SessionServices::new(gateway)
            .with_events(Arc::new(self.events))
            .with_registry(self.registry)
            .with_peers(self.peers);
        let coordinator = match self.pool {
            Some(pool) => spawn_coordinator_with_pool(config.session, pool),
            None => spawn_coordinator(config.session),
        };
        Warden {
            services,
            coordinator,
        }
    }
}

impl Default for WardenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Warden instance.
///
/// Cheap to clone; clones drive the same coordinator.
#[derive(Clone)]
pub struct Warden {
    services: SessionServices,
    coordinator: CoordinatorHandle,
}

impl Warden {
    /// Creates a new builder.
    pub fn builder() -> WardenBuilder {
        WardenBuilder::new()
    }

    /// The coordinator, for actions, saves and everything else that
    /// targets one session.
    pub fn sessions(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    /// Attaches a session built from `profile` and `mode`.
    pub async fn open(
        &self,
        profile: PlayerProfile,
        mode: AuthMode,
    ) -> Result<(), WardenError> {
        let session = PlayerSession::new(profile, mode, self.services.clone());
        Ok(self.coordinator.attach(session).await?)
    }

    /// Opens a session for a player who just connected.
    ///
    /// A stored profile starts the session [`AuthMode::Unauthenticated`]
    /// (the player must log in). No stored profile means a blank one and
    /// [`AuthMode::Unregistered`]. The lookup runs on a blocking thread.
    pub async fn join(&self, user_id: UserId, name: &str) -> Result<AuthMode, WardenError> {
        let gateway = Arc::clone(&self.services.gateway);
        let found = tokio::task::spawn_blocking(move || gateway.find_profile(user_id))
            .await
            .map_err(|_| SessionError::WorkerLost(user_id))??;

        let (profile, mode) = match found {
            Some(mut profile) => {
                if profile.last_name() != name {
                    profile.set_last_name(name);
                }
                (profile, AuthMode::Unauthenticated)
            }
            None => (
                self.services.registry.create_blank_profile(user_id, name),
                AuthMode::Unregistered,
            ),
        };
        self.open(profile, mode).await?;
        tracing::info!(%user_id, name, %mode, "player joined");
        Ok(mode)
    }

    /// Saves whatever is dirty and detaches the session.
    ///
    /// The session is detached even if the final save fails; the save
    /// error is returned so the caller can report it.
    pub async fn leave(&self, user_id: UserId) -> Result<PlayerSession, WardenError> {
        let saved = match self.coordinator.save_profile(user_id).await {
            Ok(_) | Err(SessionError::NotRegistered(_)) => Ok(()),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "final save failed");
                Err(e)
            }
        };
        let session = self.coordinator.detach(user_id).await?;
        saved?;
        tracing::info!(%user_id, "player left");
        Ok(session)
    }

    /// Stops the coordinator. Sessions still attached are dropped unsaved.
    pub async fn shutdown(&self) -> Result<(), WardenError> {
        Ok(self.coordinator.shutdown().await?)
    }
}
