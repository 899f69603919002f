//! Dirty-state tracking for persisted aggregates.
//!
//! Every aggregate that gets written to storage carries a lifecycle tag:
//!
//! ```text
//!   New ──(insert ok)──→ Unchanged ──(edit)──→ Changed
//!                            ↑                    │
//!                            └────(update ok)─────┘
//! ```
//!
//! The tag tells the save path which gateway call to make. It only moves
//! back to `Unchanged` once the write is confirmed, and only if nothing
//! edited the value while the write was in flight. The revision counter
//! is how that second condition is checked.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Persistence state of a tracked aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Matches what storage holds.
    #[default]
    Unchanged,
    /// Never written; needs an insert.
    New,
    /// Written before, edited since; needs an update.
    Changed,
}

/// A value plus its [`Lifecycle`] tag and an edit revision.
///
/// All mutation goes through [`Tracked::edit`] (or [`Tracked::replace`]),
/// so the tag can't silently fall out of sync with the value. Reading is
/// free through `Deref`.
///
/// Serialization only covers the value: a `Tracked<T>` decoded from
/// storage is `Unchanged` at revision 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tracked<T> {
    value: T,
    #[serde(skip)]
    state: Lifecycle,
    #[serde(skip)]
    revision: u64,
}

impl<T> Tracked<T> {
    /// Wraps a value that storage has never seen.
    pub fn new(value: T) -> Self {
        Self {
            value,
            state: Lifecycle::New,
            revision: 0,
        }
    }

    /// Wraps a value that was just loaded from storage.
    pub fn loaded(value: T) -> Self {
        Self {
            value,
            state: Lifecycle::Unchanged,
            revision: 0,
        }
    }

    /// Borrows the value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Current lifecycle tag.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    /// Number of edits applied since this value was created or loaded.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Mutates the value and marks it dirty.
    ///
    /// `Unchanged` becomes `Changed`; `New` stays `New` (it still needs
    /// an insert, not an update).
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut self.value);
        self.revision += 1;
        if self.state == Lifecycle::Unchanged {
            self.state = Lifecycle::Changed;
        }
        out
    }

    /// Replaces the value wholesale. Same tagging rules as [`edit`](Self::edit).
    pub fn replace(&mut self, value: T) {
        self.edit(|v| *v = value);
    }

    /// Clears the tag after a confirmed write of revision `written`.
    ///
    /// Returns `false` when the value was edited after that revision was
    /// captured: the newer edit has not been written yet, so the value
    /// stays dirty. A `New` value becomes `Changed` in that case, since
    /// storage now holds a row to update.
    pub fn mark_persisted(&mut self, written: u64) -> bool {
        if self.revision != written {
            if self.state == Lifecycle::New {
                self.state = Lifecycle::Changed;
            }
            return false;
        }
        self.state = Lifecycle::Unchanged;
        true
    }

    /// Unwraps the value, dropping the bookkeeping.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_as_new() {
        let t = Tracked::new(5);
        assert_eq!(t.lifecycle(), Lifecycle::New);
        assert_eq!(t.revision(), 0);
    }

    #[test]
    fn test_edit_on_unchanged_becomes_changed() {
        let mut t = Tracked::loaded(5);
        t.edit(|v| *v += 1);
        assert_eq!(*t, 6);
        assert_eq!(t.lifecycle(), Lifecycle::Changed);
        assert_eq!(t.revision(), 1);
    }

    #[test]
    fn test_edit_on_new_stays_new() {
        let mut t = Tracked::new(String::from("a"));
        t.replace("b".into());
        assert_eq!(t.lifecycle(), Lifecycle::New);
    }

    #[test]
    fn test_mark_persisted_current_revision_clears_tag() {
        let mut t = Tracked::loaded(1);
        t.edit(|v| *v = 2);

        assert!(t.mark_persisted(t.revision()));
        assert_eq!(t.lifecycle(), Lifecycle::Unchanged);
    }

    #[test]
    fn test_mark_persisted_stale_revision_keeps_tag() {
        // Snapshot taken at revision 1, then another edit lands before
        // the write is confirmed.
        let mut t = Tracked::loaded(1);
        t.edit(|v| *v = 2);
        let written = t.revision();
        t.edit(|v| *v = 3);

        assert!(!t.mark_persisted(written));
        assert_eq!(t.lifecycle(), Lifecycle::Changed);
    }

    #[test]
    fn test_mark_persisted_stale_insert_becomes_changed() {
        let mut t = Tracked::new(1);
        t.edit(|v| *v = 2);

        // The insert of revision 0 landed; revision 1 now needs an update.
        assert!(!t.mark_persisted(0));
        assert_eq!(t.lifecycle(), Lifecycle::Changed);
    }
}
