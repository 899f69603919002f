//! Dirty-state-driven persistence dispatch.
//!
//! Saving a profile is a three-step walk in a fixed order:
//!
//! ```text
//! location ──→ inventory ──→ profile record
//!   New → insert      New → insert      Changed → update
//!   Changed → update  Changed → update  New/Unchanged → nothing
//! ```
//!
//! The profile record is never inserted here: that happens once, during
//! registration. The walk stops at the first failing call. Tags are only
//! cleared for writes the gateway confirmed, and only if the aggregate
//! hasn't been edited since the write was planned.

use warden_types::{Lifecycle, PlayerProfile};

use crate::{GatewayError, PersistenceGateway, SessionError};

/// The gateway call planned for one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOp {
    Insert,
    Update,
}

impl SaveOp {
    fn for_sub_aggregate(state: Lifecycle) -> Option<Self> {
        match state {
            Lifecycle::New => Some(Self::Insert),
            Lifecycle::Changed => Some(Self::Update),
            Lifecycle::Unchanged => None,
        }
    }
}

/// One planned (or completed) write, pinned to the revision it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Write {
    op: SaveOp,
    revision: u64,
}

/// Which gateway calls a save of a profile would make.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavePlan {
    location: Option<Write>,
    inventory: Option<Write>,
    profile: Option<Write>,
}

impl SavePlan {
    /// Reads the lifecycle tags off `profile`.
    pub fn for_profile(profile: &PlayerProfile) -> Self {
        let location = profile.location().and_then(|l| {
            SaveOp::for_sub_aggregate(l.lifecycle()).map(|op| Write {
                op,
                revision: l.revision(),
            })
        });
        let inventory = profile.inventory().and_then(|i| {
            SaveOp::for_sub_aggregate(i.lifecycle()).map(|op| Write {
                op,
                revision: i.revision(),
            })
        });
        let profile = (profile.lifecycle() == Lifecycle::Changed).then(|| Write {
            op: SaveOp::Update,
            revision: profile.record().revision(),
        });
        Self {
            location,
            inventory,
            profile,
        }
    }

    pub fn location(&self) -> Option<SaveOp> {
        self.location.map(|w| w.op)
    }

    pub fn inventory(&self) -> Option<SaveOp> {
        self.inventory.map(|w| w.op)
    }

    /// `true` if the profile record would be updated.
    pub fn updates_profile(&self) -> bool {
        self.profile.is_some()
    }

    /// `true` if the save would make no gateway calls at all.
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.inventory.is_none() && self.profile.is_none()
    }
}

/// The writes a save actually completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    location: Option<Write>,
    inventory: Option<Write>,
    profile: Option<Write>,
}

impl SaveReport {
    pub fn location(&self) -> Option<SaveOp> {
        self.location.map(|w| w.op)
    }

    pub fn inventory(&self) -> Option<SaveOp> {
        self.inventory.map(|w| w.op)
    }

    pub fn updated_profile(&self) -> bool {
        self.profile.is_some()
    }

    /// `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.inventory.is_none() && self.profile.is_none()
    }

    /// Clears the tags of every aggregate this report covers, unless it
    /// was edited after the write was planned.
    pub(crate) fn confirm(&self, profile: &mut PlayerProfile) {
        if let (Some(w), Some(location)) = (self.location, profile.location_mut()) {
            location.mark_persisted(w.revision);
        }
        if let (Some(w), Some(inventory)) = (self.inventory, profile.inventory_mut()) {
            inventory.mark_persisted(w.revision);
        }
        if let Some(w) = self.profile {
            profile.record_mut().mark_persisted(w.revision);
        }
    }
}

/// Result of walking a plan: what got written, and the error that
/// stopped the walk, if any.
#[derive(Debug, Clone)]
pub(crate) struct SaveOutcome {
    pub(crate) report: SaveReport,
    pub(crate) error: Option<GatewayError>,
}

impl SaveOutcome {
    pub(crate) fn into_result(self) -> Result<SaveReport, SessionError> {
        match self.error {
            Some(err) => Err(SessionError::Persistence(err)),
            None => Ok(self.report),
        }
    }
}

/// Plans and executes a save of `profile`.
///
/// # Errors
/// [`SessionError::NotRegistered`] without touching the gateway if the
/// profile has no credential. Gateway failures are reported inside the
/// [`SaveOutcome`] so completed writes can still be confirmed.
pub(crate) fn save(
    gateway: &dyn PersistenceGateway,
    profile: &PlayerProfile,
) -> Result<SaveOutcome, SessionError> {
    if !profile.is_registered() {
        return Err(SessionError::NotRegistered(profile.user_id()));
    }
    let plan = SavePlan::for_profile(profile);
    tracing::debug!(
        user_id = %profile.user_id(),
        location = ?plan.location(),
        inventory = ?plan.inventory(),
        profile = plan.updates_profile(),
        "saving profile"
    );
    Ok(execute(gateway, profile, &plan))
}

fn execute(
    gateway: &dyn PersistenceGateway,
    profile: &PlayerProfile,
    plan: &SavePlan,
) -> SaveOutcome {
    let user_id = profile.user_id();
    let mut report = SaveReport::default();

    if let (Some(w), Some(location)) = (plan.location, profile.location()) {
        let result = match w.op {
            SaveOp::Insert => gateway.insert_location(user_id, location.get()),
            SaveOp::Update => gateway.update_location(user_id, location.get()),
        };
        if let Err(error) = result {
            return SaveOutcome {
                report,
                error: Some(error),
            };
        }
        report.location = Some(w);
    }

    if let (Some(w), Some(inventory)) = (plan.inventory, profile.inventory()) {
        let result = match w.op {
            SaveOp::Insert => gateway.insert_inventory(user_id, inventory.get()),
            SaveOp::Update => gateway.update_inventory(user_id, inventory.get()),
        };
        if let Err(error) = result {
            return SaveOutcome {
                report,
                error: Some(error),
            };
        }
        report.inventory = Some(w);
    }

    if let Some(w) = plan.profile {
        if let Err(error) = gateway.update_profile(profile) {
            return SaveOutcome {
                report,
                error: Some(error),
            };
        }
        report.profile = Some(w);
    }

    SaveOutcome {
        report,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use warden_types::{
        Credential, InventorySnapshot, LoginLocation, ProfileRecord, UserId,
    };

    use super::*;

    fn registered() -> PlayerProfile {
        PlayerProfile::loaded(
            UserId::from_u128(5),
            ProfileRecord {
                last_name: "Alex".into(),
                credential: Some(Credential::new("x", 1)),
                ..ProfileRecord::default()
            },
            None,
            None,
        )
    }

    #[test]
    fn test_plan_clean_profile_is_empty() {
        assert!(SavePlan::for_profile(&registered()).is_empty());
    }

    #[test]
    fn test_plan_new_location_inserts_and_skips_record() {
        let mut p = registered();
        p.set_location(LoginLocation::new("world", 0.0, 0.0, 0.0));

        let plan = SavePlan::for_profile(&p);

        assert_eq!(plan.location(), Some(SaveOp::Insert));
        assert_eq!(plan.inventory(), None);
        assert!(!plan.updates_profile());
    }

    #[test]
    fn test_plan_new_record_is_not_inserted() {
        let mut p = PlayerProfile::blank(UserId::from_u128(5), "Alex");
        p.set_credential(Some(Credential::new("x", 1)));

        // Still New: top-level insertion belongs to registration.
        assert!(!SavePlan::for_profile(&p).updates_profile());
    }

    #[test]
    fn test_plan_changed_sub_aggregates_update() {
        let mut p = PlayerProfile::loaded(
            UserId::from_u128(5),
            ProfileRecord::default(),
            Some(LoginLocation::new("world", 0.0, 0.0, 0.0)),
            Some(InventorySnapshot::default()),
        );
        p.set_location(LoginLocation::new("world", 1.0, 0.0, 0.0));
        p.set_inventory(InventorySnapshot {
            offhand: Some("shield".into()),
            ..InventorySnapshot::default()
        });
        p.set_last_name("Alexa");

        let plan = SavePlan::for_profile(&p);

        assert_eq!(plan.location(), Some(SaveOp::Update));
        assert_eq!(plan.inventory(), Some(SaveOp::Update));
        assert!(plan.updates_profile());
    }

    #[test]
    fn test_confirm_skips_aggregate_edited_after_plan() {
        let mut p = registered();
        p.set_location(LoginLocation::new("world", 0.0, 0.0, 0.0));
        let plan = SavePlan::for_profile(&p);
        let report = SaveReport {
            location: plan.location,
            ..SaveReport::default()
        };

        p.set_location(LoginLocation::new("world", 9.0, 0.0, 0.0));
        report.confirm(&mut p);

        // The second edit was never written: it must stay dirty, and as an
        // update now that the insert landed.
        assert_eq!(p.location().unwrap().lifecycle(), Lifecycle::Changed);
    }
}
