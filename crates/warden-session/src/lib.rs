//! Player authentication sessions for Warden.
//!
//! This crate is the core of the workspace. It tracks, per player,
//! whether they are authenticated, and drives every change of that state
//! through one protocol:
//!
//! 1. **Pre-action check**: listeners on the [`EventBus`] may cancel.
//! 2. **Evaluation**: the [`AuthAction`] computes a [`Transition`] or an
//!    [`ActionFailure`].
//! 3. **Commit**: the session takes the new [`AuthMode`](warden_types::AuthMode)
//!    (and profile, if the action produced one).
//! 4. **Notification**: a [`ModeChangedEvent`] when the mode really changed.
//!
//! Persistence is dirty-state driven: [`PlayerSession::save_profile`]
//! inserts or updates exactly the aggregates whose
//! [`Lifecycle`](warden_types::Lifecycle) says so.
//!
//! # Threads of control
//!
//! ```text
//! CoordinatorHandle ──(commands)──→ Coordinator task ──(jobs)──→ WorkerPool
//!        ↑                          owns every session              │
//!        └──────(replies)────────── applies results ←──(completions)┘
//! ```
//!
//! The coordinator is the only writer of session state. Workers see
//! snapshots and hand back plain values.

mod action;
mod config;
mod coordinator;
mod error;
mod events;
mod gateway;
mod peer;
mod persist;
mod pool;
mod registry;
mod session;

pub use action::{
    ActionContext, ActionFailure, ActionResponse, ActionResult, AuthAction, Transition,
};
pub use config::SessionConfig;
pub use coordinator::{
    spawn_coordinator, spawn_coordinator_with_pool, ActionCallback, CoordinatorHandle,
};
pub use error::{GatewayError, RefreshMismatch, SessionError};
pub use events::{
    AuthListener, EventBus, ModeChangedEvent, NullBus, PreActionEvent, SubscriberBus, Verdict,
};
pub use gateway::PersistenceGateway;
pub use peer::{NoPeers, PeerHandle, PeerLookup};
pub use persist::{SaveOp, SavePlan, SaveReport};
pub use pool::{Job, TokioWorkerPool, WorkerPool};
pub use registry::{BlankProfiles, SessionRegistry};
pub use session::{PlayerSession, SessionServices, SessionView};
