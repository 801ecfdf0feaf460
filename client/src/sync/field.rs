//! Per-field synchronization state machine
//!
//! Every optimistically editable value (a light's power status, each
//! schedule field, the timer fields) is wrapped in a [`TrackedField`]. The
//! field moves between three phases:
//!
//! ```text
//!             propose                 poll disagrees
//! Confirmed ───────────▶ Pending ───────────────────▶ StalePending
//!     ▲                    │  │                         │  │
//!     │   poll agrees      │  │ reject (remote error)   │  │ poll agrees /
//!     └────────────────────┘  └─────────────────────────┘  │ threshold reached
//!     ▲                                                    │
//!     └────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::snapshot::{FieldPhase, FieldView};

/// Identifier of an optimistic edit.
///
/// Drawn from the same monotonic sequence as poll start markers, so an edit
/// and a poll can always be ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub u64);

impl MutationId {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A local edit awaiting confirmation by a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit<T> {
    pub value: T,
    pub mutation: MutationId,
    /// Sequence marker taken when the remote write returned success
    pub acknowledged_at: Option<u64>,
    /// Polls (started after the acknowledgement) that reported a different value
    pub disagreements: u32,
}

/// Result of feeding one poll observation into a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Nothing changed
    Unchanged,
    /// Confirmed value changed, no edit involved
    Updated,
    /// The poll agreed with the pending edit; the edit is now confirmed
    Confirmed,
    /// The poll disagreed with the pending edit
    Disagreed { count: u32 },
    /// Disagreement reached the staleness threshold; the poll's value won
    ForceCleared,
    /// The poll cannot judge the pending edit (no value, started before it,
    /// or the remote write has not been acknowledged yet)
    Skipped,
}

/// A value with a confirmed baseline and at most one pending edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedField<T> {
    confirmed: Option<T>,
    confirmed_at: Option<DateTime<Utc>>,
    pending: Option<PendingEdit<T>>,
}

impl<T> Default for TrackedField<T> {
    fn default() -> Self {
        Self {
            confirmed: None,
            confirmed_at: None,
            pending: None,
        }
    }
}

impl<T: Clone + PartialEq> TrackedField<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A field whose value was already confirmed by a poll
    pub fn with_confirmed(value: T, at: DateTime<Utc>) -> Self {
        Self {
            confirmed: Some(value),
            confirmed_at: Some(at),
            pending: None,
        }
    }

    pub fn phase(&self) -> FieldPhase {
        match &self.pending {
            None => FieldPhase::Confirmed,
            Some(edit) if edit.disagreements > 0 => FieldPhase::StalePending,
            Some(_) => FieldPhase::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Value to display: a pending edit wins over the confirmed value
    pub fn displayed(&self) -> Option<&T> {
        match &self.pending {
            Some(edit) => Some(&edit.value),
            None => self.confirmed.as_ref(),
        }
    }

    pub fn confirmed(&self) -> Option<&T> {
        self.confirmed.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingEdit<T>> {
        self.pending.as_ref()
    }

    /// Start an optimistic edit.
    ///
    /// Fails with the id of the outstanding edit if one exists; the field is
    /// left untouched in that case.
    pub fn propose(&mut self, value: T, mutation: MutationId) -> Result<(), MutationId> {
        if let Some(edit) = &self.pending {
            return Err(edit.mutation);
        }
        self.pending = Some(PendingEdit {
            value,
            mutation,
            acknowledged_at: None,
            disagreements: 0,
        });
        Ok(())
    }

    /// The remote write for `mutation` succeeded at sequence marker `at`.
    /// The edit stays pending until a poll confirms it.
    pub fn acknowledge(&mut self, mutation: MutationId, at: u64) -> bool {
        match &mut self.pending {
            Some(edit) if edit.mutation == mutation => {
                edit.acknowledged_at = Some(at);
                true
            }
            _ => false,
        }
    }

    /// The remote write for `mutation` failed: drop the edit and fall back to
    /// the confirmed value. Returns `false` if the edit is already gone.
    pub fn reject(&mut self, mutation: MutationId) -> bool {
        match &self.pending {
            Some(edit) if edit.mutation == mutation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Feed one poll's value for this field.
    ///
    /// `observed == None` means the poll reported no value. Without a pending
    /// edit that makes the field "not configured"; with one it is ignored.
    /// `poll_started` is the sequence marker taken when the poll began.
    pub fn observe(
        &mut self,
        observed: Option<T>,
        at: DateTime<Utc>,
        poll_started: u64,
        staleness_threshold: u32,
    ) -> Observation {
        let Some(mut edit) = self.pending.take() else {
            let changed = self.confirmed != observed;
            self.confirmed = observed;
            self.confirmed_at = Some(at);
            return if changed {
                Observation::Updated
            } else {
                Observation::Unchanged
            };
        };

        let Some(value) = observed else {
            self.pending = Some(edit);
            return Observation::Skipped;
        };

        // The poll is the latest server truth even when it cannot judge the edit
        self.confirmed = Some(value.clone());
        self.confirmed_at = Some(at);

        if edit.mutation.0 > poll_started {
            self.pending = Some(edit);
            return Observation::Skipped;
        }

        if value == edit.value {
            return Observation::Confirmed;
        }

        // Only a poll that began after the service accepted the write can disagree
        if !edit.acknowledged_at.is_some_and(|ack| poll_started > ack) {
            self.pending = Some(edit);
            return Observation::Skipped;
        }

        edit.disagreements += 1;
        if edit.disagreements >= staleness_threshold.max(1) {
            return Observation::ForceCleared;
        }

        let count = edit.disagreements;
        self.pending = Some(edit);
        Observation::Disagreed { count }
    }

    pub fn view(&self) -> FieldView<T> {
        FieldView {
            value: self.displayed().cloned(),
            confirmed: self.confirmed.clone(),
            pending: self.pending.as_ref().map(|e| e.value.clone()),
            phase: self.phase(),
            confirmed_at: self.confirmed_at,
        }
    }
}
