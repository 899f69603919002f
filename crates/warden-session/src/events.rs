//! Events published by the action protocol.
//!
//! Two events, both delivered synchronously and in-process:
//!
//! - [`PreActionEvent`]: before an action runs. Any listener may cancel
//!   it by returning [`Verdict::Cancel`]; the message becomes the
//!   response the player sees.
//! - [`ModeChangedEvent`]: after a committed transition actually changed
//!   the mode. Informational only; it can't be cancelled and its return
//!   value (there is none) can't hold up the protocol.

use std::sync::Arc;

use warden_types::{AuthMode, UserId};

use crate::{AuthAction, SessionView};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Published before an action is evaluated.
pub struct PreActionEvent<'a> {
    session: &'a SessionView,
    action: &'a dyn AuthAction,
}

impl<'a> PreActionEvent<'a> {
    pub fn new(session: &'a SessionView, action: &'a dyn AuthAction) -> Self {
        Self { session, action }
    }

    pub fn session(&self) -> &'a SessionView {
        self.session
    }

    pub fn action(&self) -> &'a dyn AuthAction {
        self.action
    }

    pub fn user_id(&self) -> UserId {
        self.session.user_id()
    }
}

/// A listener's decision on a [`PreActionEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Verdict {
    #[default]
    Proceed,
    /// Stop the action. The message is handed back to the player as-is.
    Cancel(String),
}

impl Verdict {
    pub fn cancel(message: impl Into<String>) -> Self {
        Self::Cancel(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancel(_))
    }
}

/// Published after a commit that moved the session to a different mode.
pub struct ModeChangedEvent<'a> {
    session: &'a SessionView,
    previous: AuthMode,
    current: AuthMode,
}

impl<'a> ModeChangedEvent<'a> {
    pub fn new(session: &'a SessionView, previous: AuthMode, current: AuthMode) -> Self {
        Self {
            session,
            previous,
            current,
        }
    }

    pub fn session(&self) -> &'a SessionView {
        self.session
    }

    pub fn previous(&self) -> AuthMode {
        self.previous
    }

    pub fn current(&self) -> AuthMode {
        self.current
    }

    pub fn user_id(&self) -> UserId {
        self.session.user_id()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Where the protocol publishes its events.
///
/// Implementations must deliver synchronously: `publish_pre_action` only
/// returns once every listener that is going to weigh in has done so.
pub trait EventBus: Send + Sync + 'static {
    fn publish_pre_action(&self, event: &PreActionEvent<'_>) -> Verdict;

    fn publish_mode_changed(&self, event: &ModeChangedEvent<'_>);
}

/// A subscriber on a [`SubscriberBus`]. Both hooks default to doing nothing.
pub trait AuthListener: Send + Sync + 'static {
    fn on_pre_action(&self, _event: &PreActionEvent<'_>) -> Verdict {
        Verdict::Proceed
    }

    fn on_mode_changed(&self, _event: &ModeChangedEvent<'_>) {}
}

/// An [`EventBus`] backed by an ordered list of listeners.
///
/// Listeners are called in registration order. For pre-action events the
/// first listener that cancels decides; listeners after it are not asked.
#[derive(Clone, Default)]
pub struct SubscriberBus {
    listeners: Vec<Arc<dyn AuthListener>>,
}

impl SubscriberBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`subscribe`](Self::subscribe).
    pub fn with_listener(mut self, listener: Arc<dyn AuthListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn subscribe(&mut self, listener: Arc<dyn AuthListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl EventBus for SubscriberBus {
    fn publish_pre_action(&self, event: &PreActionEvent<'_>) -> Verdict {
        for listener in &self.listeners {
            let verdict = listener.on_pre_action(event);
            if verdict.is_cancelled() {
                tracing::debug!(
                    user_id = %event.user_id(),
                    action = event.action().name(),
                    "pre-action event cancelled by listener"
                );
                return verdict;
            }
        }
        Verdict::Proceed
    }

    fn publish_mode_changed(&self, event: &ModeChangedEvent<'_>) {
        for listener in &self.listeners {
            listener.on_mode_changed(event);
        }
    }
}

/// An [`EventBus`] with no listeners: never cancels, drops notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish_pre_action(&self, _event: &PreActionEvent<'_>) -> Verdict {
        Verdict::Proceed
    }

    fn publish_mode_changed(&self, _event: &ModeChangedEvent<'_>) {}
}
