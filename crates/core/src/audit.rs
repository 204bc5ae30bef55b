//! Audit bookkeeping shared by every record the engine owns.
//!
//! Records are never hard-deleted. Corrections void a record instead, which
//! keeps the full history available; `VoidInfo` bundles the actor, instant
//! and reason so that a voided record always carries all three.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserRef;

/// Creation and last-change bookkeeping for an owned record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    created_by: Option<UserRef>,
    date_created: DateTime<Utc>,
    changed_by: Option<UserRef>,
    date_changed: Option<DateTime<Utc>>,
}

impl Audit {
    /// Stamp a new record as created now.
    pub fn created_now() -> Self {
        Self::created_at(Utc::now())
    }

    /// Stamp a new record as created at `instant`.
    pub fn created_at(instant: DateTime<Utc>) -> Self {
        Self {
            created_by: None,
            date_created: instant,
            changed_by: None,
            date_changed: None,
        }
    }

    /// Record who created this record.
    pub fn with_creator(mut self, creator: UserRef) -> Self {
        self.created_by = Some(creator);
        self
    }

    /// Record a change by `actor` at `instant`.
    pub fn mark_changed(&mut self, actor: UserRef, instant: DateTime<Utc>) {
        self.changed_by = Some(actor);
        self.date_changed = Some(instant);
    }

    pub fn created_by(&self) -> Option<UserRef> {
        self.created_by
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn changed_by(&self) -> Option<UserRef> {
        self.changed_by
    }

    pub fn date_changed(&self) -> Option<DateTime<Utc>> {
        self.date_changed
    }
}

/// Why, when and by whom a record was voided.
///
/// Stored as `Option<VoidInfo>` on each voidable record: the presence of the
/// value is the void flag, so a voided record can never be missing its actor
/// or timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInfo {
    voided_by: UserRef,
    date_voided: DateTime<Utc>,
    reason: String,
}

impl VoidInfo {
    pub fn new(voided_by: UserRef, date_voided: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            voided_by,
            date_voided,
            reason: reason.into(),
        }
    }

    pub fn voided_by(&self) -> UserRef {
        self.voided_by
    }

    pub fn date_voided(&self) -> DateTime<Utc> {
        self.date_voided
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
