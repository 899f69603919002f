//! # Warden
//!
//! Player authentication sessions for game servers.
//!
//! Warden tracks, per connected player, whether they have an account and
//! whether they have proven who they are. Games plug their own rules in
//! as [`AuthAction`](warden_session::AuthAction)s; Warden runs them
//! through one protocol (pre-action check, evaluation, commit,
//! notification) and persists only the parts of a profile that changed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use warden::prelude::*;
//!
//! # async fn run(gateway: Arc<dyn PersistenceGateway>) -> Result<(), WardenError> {
//! init_logging("info");
//! let warden = Warden::builder().start(gateway);
//!
//! let id = UserId::random();
//! warden.join(id, "Alex").await?;
//! // warden.sessions().perform_action(id, Arc::new(MyLogin)).await?;
//! warden.leave(id).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod host;
mod logging;

pub use config::WardenConfig;
pub use error::{ConfigError, WardenError};
pub use host::{Warden, WardenBuilder};
pub use logging::init_logging;

pub use warden_session as session;
pub use warden_types as types;

/// The types most hosts need, in one import.
pub mod prelude {
    pub use crate::{init_logging, Warden, WardenBuilder, WardenConfig, WardenError};
    pub use warden_session::{
        ActionContext, ActionResponse, ActionResult, AuthAction, AuthListener,
        CoordinatorHandle, ModeChangedEvent, PersistenceGateway, PreActionEvent, SessionConfig,
        SessionError, Transition, Verdict,
    };
    pub use warden_types::{AuthMode, Credential, PlayerProfile, UserId};
}
