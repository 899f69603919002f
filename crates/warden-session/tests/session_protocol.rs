//! Integration tests for `PlayerSession`: accessor invariants, the action
//! protocol, dirty-state saves, refresh, and reset.
//!
//! All of these run synchronously against `MemoryGateway` and inspect its
//! call log.

use std::sync::{Arc, Mutex};

use warden_session::{
    ActionContext, ActionResult, AuthAction, AuthListener, GatewayError, ModeChangedEvent,
    PeerHandle, PeerLookup, PlayerSession, PreActionEvent, RefreshMismatch, SaveOp,
    SessionError, SessionRegistry, SessionServices, SubscriberBus, Transition, Verdict,
};
use warden_store::{CallKind, GatewayCall, MemoryGateway};
use warden_types::{
    AuthMode, Credential, InventorySnapshot, Lifecycle, LoginLocation, PlayerProfile,
    ProfileRecord, UserId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records both event kinds and optionally cancels pre-action events.
#[derive(Default)]
struct Recorder {
    cancel_with: Option<String>,
    pre_actions: Mutex<Vec<String>>,
    changes: Mutex<Vec<(AuthMode, AuthMode)>>,
}

impl Recorder {
    fn cancelling(message: &str) -> Self {
        Self {
            cancel_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn changes(&self) -> Vec<(AuthMode, AuthMode)> {
        self.changes.lock().unwrap().clone()
    }
}

impl AuthListener for Recorder {
    fn on_pre_action(&self, event: &PreActionEvent<'_>) -> Verdict {
        self.pre_actions
            .lock()
            .unwrap()
            .push(event.action().name().to_string());
        match &self.cancel_with {
            Some(message) => Verdict::cancel(message.clone()),
            None => Verdict::Proceed,
        }
    }

    fn on_mode_changed(&self, event: &ModeChangedEvent<'_>) {
        // The session already holds the new mode when this fires.
        assert_eq!(event.session().auth_mode(), event.current());
        self.changes
            .lock()
            .unwrap()
            .push((event.previous(), event.current()));
    }
}

/// An action that returns a fixed result and counts its runs.
struct Scripted {
    result: ActionResult,
    runs: Mutex<usize>,
}

impl Scripted {
    fn new(result: ActionResult) -> Self {
        Self {
            result,
            runs: Mutex::new(0),
        }
    }

    fn runs(&self) -> usize {
        *self.runs.lock().unwrap()
    }
}

impl AuthAction for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run(&self, _ctx: &ActionContext<'_>) -> ActionResult {
        *self.runs.lock().unwrap() += 1;
        self.result.clone()
    }
}

fn uid() -> UserId {
    UserId::from_u128(0x5EED)
}

fn registered_record() -> ProfileRecord {
    ProfileRecord {
        last_name: "Alex".into(),
        credential: Some(Credential::new("$argon2$hash", 1)),
        registered_at: Some(1_700_000_000),
        ..ProfileRecord::default()
    }
}

/// A registered profile as it would come out of storage: every tag clean.
fn stored_profile() -> PlayerProfile {
    PlayerProfile::loaded(uid(), registered_record(), None, None)
}

fn unregistered_profile() -> PlayerProfile {
    PlayerProfile::blank(uid(), "Alex")
}

struct Fixture {
    store: MemoryGateway,
    recorder: Arc<Recorder>,
    session: PlayerSession,
}

fn fixture_with(profile: PlayerProfile, mode: AuthMode, recorder: Recorder) -> Fixture {
    let store = MemoryGateway::new();
    let recorder = Arc::new(recorder);
    let bus = SubscriberBus::new().with_listener(recorder.clone());
    let services = SessionServices::new(Arc::new(store.clone())).with_events(Arc::new(bus));
    Fixture {
        store,
        recorder,
        session: PlayerSession::new(profile, mode, services),
    }
}

fn fixture(profile: PlayerProfile, mode: AuthMode) -> Fixture {
    fixture_with(profile, mode, Recorder::default())
}

// ===========================================================================
// Accessor invariants
// ===========================================================================

#[test]
fn test_is_logged_in_implies_registered_and_authorized() {
    let modes = [
        AuthMode::Unauthenticated,
        AuthMode::Unregistered,
        AuthMode::Authenticated,
    ];
    for profile in [stored_profile(), unregistered_profile()] {
        for mode in modes {
            let f = fixture(profile.clone(), mode);
            let s = &f.session;

            assert_eq!(s.is_registered(), profile.credential().is_some());
            assert_eq!(s.is_authorized(), mode == AuthMode::Authenticated);
            assert_eq!(s.is_logged_in(), s.is_registered() && s.is_authorized());
        }
    }
}

#[test]
fn test_is_logged_in_authorized_guest_is_not_logged_in() {
    let f = fixture(unregistered_profile(), AuthMode::Authenticated);

    assert!(f.session.is_authorized());
    assert!(!f.session.is_logged_in());
}

#[test]
fn test_player_resolves_last_name_through_lookup() {
    struct OneOnline;

    impl PeerLookup for OneOnline {
        fn by_name(&self, name: &str) -> Option<PeerHandle> {
            (name == "Alex").then(|| PeerHandle {
                name: name.to_string(),
                connection_id: 42,
            })
        }
    }

    let services =
        SessionServices::new(Arc::new(MemoryGateway::new())).with_peers(Arc::new(OneOnline));
    let mut session = PlayerSession::new(stored_profile(), AuthMode::Authenticated, services);

    assert_eq!(session.player().map(|p| p.connection_id), Some(42));

    session.profile_mut().set_last_name("Someone");
    assert_eq!(session.player(), None);
}

// ===========================================================================
// Action protocol
// ===========================================================================

#[test]
fn test_perform_action_cancelled_returns_listener_message() {
    let mut f = fixture_with(
        unregistered_profile(),
        AuthMode::Unregistered,
        Recorder::cancelling("You must wait 5 seconds before trying again."),
    );
    let action = Scripted::new(Ok(Transition::to(AuthMode::Authenticated)));

    let response = f.session.perform_action(&action);

    assert!(!response.is_success());
    assert_eq!(
        response.message(),
        Some("You must wait 5 seconds before trying again.")
    );
    assert_eq!(f.session.auth_mode(), AuthMode::Unregistered);
    assert_eq!(action.runs(), 0, "cancelled actions never run");
    assert!(f.recorder.changes().is_empty());
}

#[test]
fn test_perform_action_failure_does_not_commit() {
    let mut f = fixture(stored_profile(), AuthMode::Unauthenticated);
    let action = Scripted::new(Err("Invalid password".into()));

    let response = f.session.perform_action(&action);

    assert!(!response.is_success());
    assert_eq!(response.message(), Some("Invalid password"));
    assert_eq!(f.session.auth_mode(), AuthMode::Unauthenticated);
    assert!(f.recorder.changes().is_empty());
}

#[test]
fn test_perform_action_mode_change_notifies_exactly_once() {
    let mut f = fixture(stored_profile(), AuthMode::Unauthenticated);
    let action = Scripted::new(Ok(
        Transition::to(AuthMode::Authenticated).with_message("Logged in")
    ));

    let response = f.session.perform_action(&action);

    assert!(response.is_success());
    assert_eq!(response.message(), Some("Logged in"));
    assert_eq!(f.session.auth_mode(), AuthMode::Authenticated);
    assert_eq!(
        f.recorder.changes(),
        vec![(AuthMode::Unauthenticated, AuthMode::Authenticated)]
    );
    assert_eq!(*f.recorder.pre_actions.lock().unwrap(), vec!["scripted"]);
}

#[test]
fn test_perform_action_same_mode_is_silent_success() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);
    let action = Scripted::new(Ok(Transition::to(AuthMode::Authenticated)));

    let response = f.session.perform_action(&action);

    assert!(response.is_success());
    assert_eq!(f.session.auth_mode(), AuthMode::Authenticated);
    assert!(f.recorder.changes().is_empty());
}

#[test]
fn test_perform_action_registration_inserts_and_commits_profile() {
    /// Stores the credential and inserts the profile, like a real
    /// registration would.
    struct Register;

    impl AuthAction for Register {
        fn name(&self) -> &str {
            "register"
        }

        fn run(&self, ctx: &ActionContext<'_>) -> ActionResult {
            if ctx.session().is_registered() {
                return Err("already registered".into());
            }
            let mut profile = ctx.profile().clone();
            profile.set_credential(Some(Credential::new("hash", 1)));
            ctx.gateway()
                .insert_profile(&profile)
                .map_err(|e| e.to_string())?;
            let written = profile.record().revision();
            profile.record_mut().mark_persisted(written);
            Ok(Transition::to(AuthMode::Authenticated).with_profile(profile))
        }
    }

    let mut f = fixture(unregistered_profile(), AuthMode::Unregistered);

    let response = f.session.perform_action(&Register);

    assert!(response.is_success());
    assert!(f.session.is_logged_in());
    assert_eq!(f.session.profile().lifecycle(), Lifecycle::Unchanged);
    assert!(f.store.stored(uid()).unwrap().is_some());
}

// ===========================================================================
// save_profile()
// ===========================================================================

#[test]
fn test_save_profile_unregistered_makes_zero_calls() {
    let mut f = fixture(unregistered_profile(), AuthMode::Unregistered);
    f.session
        .profile_mut()
        .set_location(LoginLocation::new("world", 0.0, 0.0, 0.0));

    let result = f.session.save_profile();

    assert_eq!(result, Err(SessionError::NotRegistered(uid())));
    assert!(f.store.calls().is_empty());
    assert_eq!(
        f.session.profile().location().unwrap().lifecycle(),
        Lifecycle::New
    );
}

#[test]
fn test_save_profile_new_location_only_inserts_location() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);
    f.store.seed(&stored_profile()).unwrap();
    f.session
        .profile_mut()
        .set_location(LoginLocation::new("world", 12.5, 70.0, -4.0));

    let report = f.session.save_profile().unwrap();

    assert_eq!(
        f.store.calls(),
        vec![GatewayCall::new(CallKind::InsertLocation, uid())]
    );
    assert_eq!(report.location(), Some(SaveOp::Insert));
    assert_eq!(report.inventory(), None);
    assert!(!report.updated_profile());
    assert_eq!(
        f.session.profile().location().unwrap().lifecycle(),
        Lifecycle::Unchanged
    );
}

#[test]
fn test_save_profile_unchanged_aggregates_make_no_calls() {
    let profile = PlayerProfile::loaded(
        uid(),
        registered_record(),
        Some(LoginLocation::new("world", 0.0, 0.0, 0.0)),
        Some(InventorySnapshot::default()),
    );
    let mut f = fixture(profile, AuthMode::Authenticated);

    let report = f.session.save_profile().unwrap();

    assert!(report.is_empty());
    assert!(f.store.calls().is_empty());
}

#[test]
fn test_save_profile_dispatch_order_is_location_inventory_profile() {
    let profile = PlayerProfile::loaded(
        uid(),
        registered_record(),
        Some(LoginLocation::new("world", 0.0, 0.0, 0.0)),
        None,
    );
    let mut f = fixture(profile.clone(), AuthMode::Authenticated);
    f.store.seed(&profile).unwrap();
    {
        let p = f.session.profile_mut();
        p.set_location(LoginLocation::new("nether", 1.0, 2.0, 3.0));
        p.set_inventory(InventorySnapshot::default());
        p.set_last_login(1_700_000_500);
    }

    f.session.save_profile().unwrap();

    let kinds: Vec<CallKind> = f.store.calls().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CallKind::UpdateLocation,
            CallKind::InsertInventory,
            CallKind::UpdateProfile
        ]
    );
    assert!(!f.session.profile().is_dirty());
    assert_eq!(f.store.stored(uid()).unwrap().unwrap().last_login(), Some(1_700_000_500));
}

#[test]
fn test_save_profile_failure_keeps_failed_and_later_tags() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);
    f.store.seed(&stored_profile()).unwrap();
    f.store.fail_on(
        CallKind::InsertInventory,
        GatewayError::Unavailable("db offline".into()),
    );
    {
        let p = f.session.profile_mut();
        p.set_location(LoginLocation::new("world", 0.0, 0.0, 0.0));
        p.set_inventory(InventorySnapshot::default());
        p.set_last_name("Alexa");
    }

    let result = f.session.save_profile();

    assert_eq!(
        result,
        Err(SessionError::Persistence(GatewayError::Unavailable(
            "db offline".into()
        )))
    );
    let p = f.session.profile();
    assert_eq!(p.location().unwrap().lifecycle(), Lifecycle::Unchanged);
    assert_eq!(p.inventory().unwrap().lifecycle(), Lifecycle::New);
    assert_eq!(p.lifecycle(), Lifecycle::Changed);
    assert_eq!(f.store.count(CallKind::UpdateProfile), 0);

    // A retry picks up exactly what is still dirty.
    f.store.clear_faults();
    f.store.clear_calls();
    f.session.save_profile().unwrap();
    let kinds: Vec<CallKind> = f.store.calls().iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CallKind::InsertInventory, CallKind::UpdateProfile]);
}

// ===========================================================================
// refresh_profile() / reset_profile()
// ===========================================================================

#[test]
fn test_refresh_profile_found_but_unregistered_errors() {
    let mut f = fixture(unregistered_profile(), AuthMode::Unregistered);
    f.store.seed(&stored_profile()).unwrap();

    let result = f.session.refresh_profile();

    assert_eq!(
        result,
        Err(SessionError::ProfileRefresh {
            user_id: uid(),
            mismatch: RefreshMismatch::RegisteredInStore,
        })
    );
}

#[test]
fn test_refresh_profile_missing_but_registered_errors() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);

    let result = f.session.refresh_profile();

    assert_eq!(
        result,
        Err(SessionError::ProfileRefresh {
            user_id: uid(),
            mismatch: RefreshMismatch::MissingFromStore,
        })
    );
}

#[test]
fn test_refresh_profile_absent_and_unregistered_keeps_profile() {
    let mut f = fixture(unregistered_profile(), AuthMode::Unregistered);
    f.session.profile_mut().set_ip_address(Some("10.0.0.7".into()));
    let before = f.session.profile().clone();
    let address = f.session.profile() as *const PlayerProfile;

    f.session.refresh_profile().unwrap();

    assert_eq!(f.session.profile(), &before);
    assert!(std::ptr::eq(f.session.profile(), address));
    assert_eq!(f.store.count(CallKind::FindProfile), 1);
}

#[test]
fn test_refresh_profile_replaces_profile_and_keeps_mode() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);
    let mut canonical = stored_profile();
    canonical.set_last_name("Renamed");
    f.store.seed(&canonical).unwrap();
    f.session.profile_mut().set_last_login(1);

    f.session.refresh_profile().unwrap();

    assert_eq!(f.session.profile().last_name(), "Renamed");
    assert_eq!(f.session.profile().last_login(), None);
    assert!(!f.session.profile().is_dirty());
    assert_eq!(f.session.auth_mode(), AuthMode::Authenticated);
}

#[test]
fn test_refresh_profile_gateway_failure_propagates() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);
    f.store.fail_on(CallKind::FindProfile, GatewayError::Backend("timeout".into()));

    let result = f.session.refresh_profile();

    assert_eq!(
        result,
        Err(SessionError::Persistence(GatewayError::Backend("timeout".into())))
    );
    assert_eq!(f.session.profile(), &stored_profile());
}

#[test]
fn test_reset_profile_yields_blank_profile_for_same_player() {
    let mut f = fixture(stored_profile(), AuthMode::Authenticated);

    f.session.reset_profile();

    assert_eq!(f.session.user_id(), uid());
    assert!(!f.session.is_registered());
    assert_eq!(f.session.auth_mode(), AuthMode::Authenticated);
    assert!(f.store.calls().is_empty());
}

#[test]
fn test_reset_profile_uses_injected_registry() {
    struct Spawned;

    impl SessionRegistry for Spawned {
        fn create_blank_profile(&self, user_id: UserId, last_name: &str) -> PlayerProfile {
            let mut p = PlayerProfile::blank(user_id, last_name);
            p.set_location(LoginLocation::new("spawn", 0.0, 64.0, 0.0));
            p
        }
    }

    let services = SessionServices::new(Arc::new(MemoryGateway::new()))
        .with_registry(Arc::new(Spawned));
    let mut session = PlayerSession::new(stored_profile(), AuthMode::Authenticated, services);

    session.reset_profile();

    assert_eq!(session.profile().last_name(), "Alex");
    assert_eq!(session.profile().location().unwrap().get().world, "spawn");
}
