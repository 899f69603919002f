//! The player session state machine.
//!
//! A session is the server's record of one player's authentication state:
//!
//! - WHO the player is and what is stored about them ([`PlayerProfile`])
//! - WHETHER they may act right now ([`AuthMode`])
//! - the collaborators it talks to ([`SessionServices`])
//!
//! ```text
//!                 perform_action(action)
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ PreActionEvent ─cancel→ failed response (mode untouched)  │
//!   │       │ proceed                                           │
//!   │       ▼                                                   │
//!   │ action.run() ─Err→ failed response (mode untouched)       │
//!   │       │ Ok(transition)                                    │
//!   │       ▼                                                   │
//!   │ commit mode (+profile) ─mode differs→ ModeChangedEvent    │
//!   │       ▼                                                   │
//!   │ successful response                                       │
//!   └──────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use warden_types::{AuthMode, PlayerProfile, UserId};

use crate::persist::{self, SaveOutcome};
use crate::{
    ActionContext, ActionResponse, ActionResult, AuthAction, BlankProfiles, EventBus,
    GatewayError, ModeChangedEvent, NoPeers, NullBus, PeerHandle, PeerLookup,
    PersistenceGateway, PreActionEvent, RefreshMismatch, SavePlan, SaveReport, SessionError,
    SessionRegistry, Verdict,
};

/// Response message for a transition refused because the profile moved on
/// while the action was evaluated.
const STALE_ACTION: &str = "profile changed while the action ran, try again";

// ---------------------------------------------------------------------------
// SessionView
// ---------------------------------------------------------------------------

/// The state half of a session: one profile and one mode.
///
/// This is what actions and event listeners see. On the async path it is
/// cloned and shipped to a worker as a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    profile: PlayerProfile,
    mode: AuthMode,
}

impl SessionView {
    pub fn new(profile: PlayerProfile, mode: AuthMode) -> Self {
        Self { profile, mode }
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.mode
    }

    pub fn user_id(&self) -> UserId {
        self.profile.user_id()
    }

    /// `true` when the profile carries a credential.
    pub fn is_registered(&self) -> bool {
        self.profile.is_registered()
    }

    /// `true` only in [`AuthMode::Authenticated`].
    ///
    /// Note that this includes players who are allowed to play without an
    /// account; use [`is_logged_in`](Self::is_logged_in) to require one.
    pub fn is_authorized(&self) -> bool {
        self.mode.is_authorized()
    }

    /// Authorized AND registered.
    pub fn is_logged_in(&self) -> bool {
        self.is_authorized() && self.is_registered()
    }
}

/// Where a session's profile stood when an action was dispatched.
///
/// Equal stamps mean nothing was edited or replaced in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProfileStamp {
    epoch: u64,
    record: u64,
    location: Option<u64>,
    inventory: Option<u64>,
}

// ---------------------------------------------------------------------------
// SessionServices
// ---------------------------------------------------------------------------

/// The collaborators a session calls out to, injected at construction.
///
/// Cheap to clone: every field is an `Arc`. One bundle is usually shared
/// by all sessions on a server.
#[derive(Clone)]
pub struct SessionServices {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub events: Arc<dyn EventBus>,
    pub registry: Arc<dyn SessionRegistry>,
    pub peers: Arc<dyn PeerLookup>,
}

impl SessionServices {
    /// Services around `gateway` with no listeners, plain blank profiles,
    /// and no live peers.
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            events: Arc::new(NullBus),
            registry: Arc::new(BlankProfiles),
            peers: Arc::new(NoPeers),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_peers(mut self, peers: Arc<dyn PeerLookup>) -> Self {
        self.peers = peers;
        self
    }
}

// ---------------------------------------------------------------------------
// PlayerSession
// ---------------------------------------------------------------------------

/// One player's authentication session.
///
/// Created by the host with an initial profile and mode. All methods take
/// `&mut self` for mutation, so whoever owns the session (usually the
/// [`CoordinatorHandle`](crate::CoordinatorHandle)'s task) is the only
/// writer.
pub struct PlayerSession {
    view: SessionView,
    /// Bumped whenever the profile is replaced wholesale, so results of
    /// async saves against an older profile are not applied to a new one.
    epoch: u64,
    services: SessionServices,
}

impl fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("view", &self.view)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl PlayerSession {
    pub fn new(profile: PlayerProfile, mode: AuthMode, services: SessionServices) -> Self {
        Self {
            view: SessionView::new(profile, mode),
            epoch: 0,
            services,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.view.profile
    }

    /// Mutable access for in-place edits. Edits go through the profile's
    /// tracked setters, so they mark the touched aggregate dirty.
    pub fn profile_mut(&mut self) -> &mut PlayerProfile {
        &mut self.view.profile
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.view.mode
    }

    pub fn user_id(&self) -> UserId {
        self.view.user_id()
    }

    pub fn is_registered(&self) -> bool {
        self.view.is_registered()
    }

    pub fn is_authorized(&self) -> bool {
        self.view.is_authorized()
    }

    pub fn is_logged_in(&self) -> bool {
        self.view.is_logged_in()
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn stamp(&self) -> ProfileStamp {
        let profile = &self.view.profile;
        ProfileStamp {
            epoch: self.epoch,
            record: profile.record().revision(),
            location: profile.location().map(|l| l.revision()),
            inventory: profile.inventory().map(|i| i.revision()),
        }
    }

    /// The connected peer for this player's last-known name, if any.
    ///
    /// Asks the [`PeerLookup`] every time: no caching, no retry.
    pub fn player(&self) -> Option<PeerHandle> {
        self.services.peers.by_name(self.view.profile.last_name())
    }

    // -- Persistence ------------------------------------------------------

    /// The gateway calls [`save_profile`](Self::save_profile) would make
    /// right now.
    pub fn save_plan(&self) -> SavePlan {
        SavePlan::for_profile(&self.view.profile)
    }

    /// Writes every dirty aggregate through the gateway, inline.
    ///
    /// Location first, then inventory, then the profile record (update
    /// only). Each aggregate's tag is cleared once its write succeeds.
    ///
    /// # Errors
    /// - [`SessionError::NotRegistered`]: no credential; nothing is written.
    /// - [`SessionError::Persistence`]: a gateway call failed. Writes
    ///   before it stay confirmed; the failed aggregate and the ones after
    ///   it keep their tags.
    pub fn save_profile(&mut self) -> Result<SaveReport, SessionError> {
        let gateway = Arc::clone(&self.services.gateway);
        let outcome = persist::save(gateway.as_ref(), &self.view.profile)?;
        self.apply_save(self.epoch, outcome)
    }

    /// Confirms a save that ran against a snapshot of epoch `epoch`.
    pub(crate) fn apply_save(
        &mut self,
        epoch: u64,
        outcome: SaveOutcome,
    ) -> Result<SaveReport, SessionError> {
        if epoch == self.epoch {
            outcome.report.confirm(&mut self.view.profile);
        } else {
            tracing::debug!(
                user_id = %self.user_id(),
                "profile replaced during save, leaving tags as they are"
            );
        }
        if let Some(error) = &outcome.error {
            tracing::warn!(user_id = %self.user_id(), %error, "profile save failed");
        }
        outcome.into_result()
    }

    // -- Refresh & reset --------------------------------------------------

    /// Reloads the profile from storage, replacing the in-memory one.
    ///
    /// The mode is left alone.
    ///
    /// # Errors
    /// - [`SessionError::ProfileRefresh`]: storage and session disagree
    ///   on whether the player is registered.
    /// - [`SessionError::Persistence`]: the lookup itself failed.
    pub fn refresh_profile(&mut self) -> Result<(), SessionError> {
        let found = self.services.gateway.find_profile(self.user_id());
        self.apply_refresh(found)
    }

    /// Applies the result of a profile lookup.
    pub(crate) fn apply_refresh(
        &mut self,
        found: Result<Option<PlayerProfile>, GatewayError>,
    ) -> Result<(), SessionError> {
        let user_id = self.user_id();
        match (found?, self.is_registered()) {
            (Some(_), false) => Err(SessionError::ProfileRefresh {
                user_id,
                mismatch: RefreshMismatch::RegisteredInStore,
            }),
            (None, true) => Err(SessionError::ProfileRefresh {
                user_id,
                mismatch: RefreshMismatch::MissingFromStore,
            }),
            (None, false) => {
                tracing::debug!(%user_id, "refresh: player not registered, nothing to load");
                Ok(())
            }
            (Some(profile), true) => {
                self.replace_profile(profile);
                tracing::debug!(%user_id, "profile refreshed from storage");
                Ok(())
            }
        }
    }

    /// Throws the profile away and starts over with a blank one for the
    /// same player. Unsaved changes are lost; the mode is left alone.
    pub fn reset_profile(&mut self) {
        let user_id = self.user_id();
        let blank = self
            .services
            .registry
            .create_blank_profile(user_id, self.view.profile.last_name());
        self.replace_profile(blank);
        tracing::debug!(%user_id, "profile reset to blank");
    }

    fn replace_profile(&mut self, profile: PlayerProfile) {
        self.view.profile = profile;
        self.epoch += 1;
    }

    // -- Action protocol --------------------------------------------------

    /// Runs `action` through the full protocol, inline.
    ///
    /// Always returns exactly one [`ActionResponse`]. The mode only moves
    /// when no listener cancelled and the action returned `Ok`.
    pub fn perform_action(&mut self, action: &dyn AuthAction) -> ActionResponse {
        if let Err(cancelled) = self.begin_action(action) {
            return cancelled;
        }
        let dispatched = self.stamp();
        let result = action.run(&ActionContext::new(
            &self.view,
            self.services.gateway.as_ref(),
        ));
        self.complete_action(action.name(), result, dispatched)
    }

    /// Publishes the pre-action event. `Err` carries the response for a
    /// cancelled action.
    pub(crate) fn begin_action(&self, action: &dyn AuthAction) -> Result<(), ActionResponse> {
        let event = PreActionEvent::new(&self.view, action);
        match self.services.events.publish_pre_action(&event) {
            Verdict::Proceed => Ok(()),
            Verdict::Cancel(message) => {
                tracing::debug!(
                    user_id = %self.user_id(),
                    action = action.name(),
                    %message,
                    "action cancelled before running"
                );
                Err(ActionResponse::failed(message))
            }
        }
    }

    /// Commits an evaluated action and publishes the mode change, if any.
    ///
    /// "Previous mode" is the mode held right now, at commit time. The
    /// action saw the profile as of `dispatched`; if the profile was
    /// replaced since, or the transition carries a profile and anything
    /// was edited since, the transition is refused so those edits are not
    /// overwritten.
    pub(crate) fn complete_action(
        &mut self,
        action: &str,
        result: ActionResult,
        dispatched: ProfileStamp,
    ) -> ActionResponse {
        let user_id = self.user_id();
        let transition = match result {
            Ok(transition) => transition,
            Err(failure) => {
                tracing::debug!(%user_id, action, reason = %failure, "action failed");
                return ActionResponse::failed(failure.into_message());
            }
        };

        let (mode, message, profile) = transition.into_parts();
        let current = self.stamp();
        if current.epoch != dispatched.epoch || (profile.is_some() && current != dispatched) {
            tracing::debug!(
                %user_id,
                action,
                "profile changed while the action ran, refusing transition"
            );
            return ActionResponse::failed(STALE_ACTION);
        }
        if let Some(profile) = &profile {
            if profile.user_id() != user_id {
                tracing::warn!(
                    %user_id,
                    action,
                    other = %profile.user_id(),
                    "action returned a profile for another player, rejecting"
                );
                return ActionResponse::failed("action produced an invalid profile");
            }
        }

        let previous = self.view.mode;
        if let Some(profile) = profile {
            self.replace_profile(profile);
        }
        self.view.mode = mode;

        if previous != mode {
            tracing::info!(%user_id, action, from = %previous, to = %mode, "auth mode changed");
            let event = ModeChangedEvent::new(&self.view, previous, mode);
            self.services.events.publish_mode_changed(&event);
        }

        ActionResponse::succeeded(message)
    }
}
