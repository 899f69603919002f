//! The pluggable action protocol.
//!
//! Warden doesn't decide what "logging in" or "registering" means; that
//! is up to the game. Instead it defines the [`AuthAction`] trait: one
//! method that looks at a session and either produces a [`Transition`]
//! (the mode to move to, plus an optional message and replacement
//! profile) or an [`ActionFailure`].
//!
//! Failures are ordinary values. Wrong passwords and policy denials
//! happen all the time, so they travel back as an [`ActionResponse`] with
//! `success == false` instead of as errors.

use std::fmt;

use warden_types::{AuthMode, PlayerProfile};

use crate::{PersistenceGateway, SessionView};

// ---------------------------------------------------------------------------
// ActionContext
// ---------------------------------------------------------------------------

/// What an action gets to look at while it runs.
///
/// On the async path the action runs on a worker thread, so the view is a
/// snapshot of the session taken when the action was dispatched. The
/// gateway is there for actions that need blocking I/O, such as inserting
/// a freshly registered profile.
pub struct ActionContext<'a> {
    session: &'a SessionView,
    gateway: &'a dyn PersistenceGateway,
}

impl<'a> ActionContext<'a> {
    pub fn new(session: &'a SessionView, gateway: &'a dyn PersistenceGateway) -> Self {
        Self { session, gateway }
    }

    pub fn session(&self) -> &'a SessionView {
        self.session
    }

    pub fn profile(&self) -> &'a PlayerProfile {
        self.session.profile()
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.session.auth_mode()
    }

    pub fn gateway(&self) -> &'a dyn PersistenceGateway {
        self.gateway
    }
}

// ---------------------------------------------------------------------------
// Transition / ActionFailure
// ---------------------------------------------------------------------------

/// A successful action outcome: the mode to commit, and optionally a
/// user-facing message and a replacement profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    mode: AuthMode,
    message: Option<String>,
    profile: Option<PlayerProfile>,
}

impl Transition {
    /// Moves the session to `mode`.
    pub fn to(mode: AuthMode) -> Self {
        Self {
            mode,
            message: None,
            profile: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replaces the session's profile wholesale on commit.
    ///
    /// The profile must belong to the same player; the protocol rejects
    /// the transition otherwise.
    pub fn with_profile(mut self, profile: PlayerProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn profile(&self) -> Option<&PlayerProfile> {
        self.profile.as_ref()
    }

    pub(crate) fn into_parts(self) -> (AuthMode, Option<String>, Option<PlayerProfile>) {
        (self.mode, self.message, self.profile)
    }
}

/// An action declined to change the session. `message` is shown to the
/// player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    message: String,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&str> for ActionFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ActionFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// What [`AuthAction::run`] returns.
pub type ActionResult = Result<Transition, ActionFailure>;

// ---------------------------------------------------------------------------
// AuthAction
// ---------------------------------------------------------------------------

/// One authentication business rule and the mode transition it causes.
///
/// Implementations are stateless: everything they need arrives through
/// the [`ActionContext`]. `Send + Sync + 'static` because the coordinator
/// ships actions to worker threads.
///
/// # Example
///
/// ```rust
/// use warden_session::{ActionContext, ActionResult, AuthAction, Transition};
/// use warden_types::AuthMode;
///
/// /// Lets anyone without an account play as a guest.
/// struct GuestPass;
///
/// impl AuthAction for GuestPass {
///     fn name(&self) -> &str {
///         "guest-pass"
///     }
///
///     fn run(&self, ctx: &ActionContext<'_>) -> ActionResult {
///         if ctx.session().is_registered() {
///             return Err("you have an account, please log in".into());
///         }
///         Ok(Transition::to(AuthMode::Authenticated).with_message("welcome, guest"))
///     }
/// }
/// ```
pub trait AuthAction: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Evaluates the action against the session.
    fn run(&self, ctx: &ActionContext<'_>) -> ActionResult;
}

// ---------------------------------------------------------------------------
// ActionResponse
// ---------------------------------------------------------------------------

/// The single outcome of one protocol run, handed back to whoever
/// performed the action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResponse {
    success: bool,
    message: Option<String>,
}

impl ActionResponse {
    pub fn succeeded(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_response_default_is_unsuccessful_without_message() {
        let r = ActionResponse::default();
        assert!(!r.is_success());
        assert_eq!(r.message(), None);
    }

    #[test]
    fn test_transition_builder_keeps_message() {
        let t = Transition::to(AuthMode::Authenticated).with_message("hi");
        assert_eq!(t.mode(), AuthMode::Authenticated);
        assert_eq!(t.message(), Some("hi"));
        assert!(t.profile().is_none());
    }
}
