//! Timesheet status graph.
//!
//! ```text
//! draft ─────────────┐
//!                    ▼
//! changes_requested ─► submitted ─► approved
//!        ▲              │
//!        └──────────────┘
//! ```
//!
//! `approved` is terminal. Every other edge is rejected with
//! [`AppError::InvalidTransition`].

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::model::TimesheetStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Submit,
    Approve,
    RequestChanges,
}

impl Transition {
    pub const ALL: [Transition; 3] = [
        Transition::Submit,
        Transition::Approve,
        Transition::RequestChanges,
    ];

    /// Statuses this transition may start from
    pub fn sources(self) -> &'static [TimesheetStatus] {
        match self {
            Transition::Submit => &[TimesheetStatus::Draft, TimesheetStatus::ChangesRequested],
            Transition::Approve | Transition::RequestChanges => &[TimesheetStatus::Submitted],
        }
    }

    pub fn target(self) -> TimesheetStatus {
        match self {
            Transition::Submit => TimesheetStatus::Submitted,
            Transition::Approve => TimesheetStatus::Approved,
            Transition::RequestChanges => TimesheetStatus::ChangesRequested,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Approve => "approve",
            Transition::RequestChanges => "request changes on",
        }
    }

    /// Resolve the status reached from `from`, or reject the edge
    pub fn apply(self, from: TimesheetStatus) -> AppResult<TimesheetStatus> {
        if self.sources().contains(&from) {
            Ok(self.target())
        } else {
            Err(AppError::InvalidTransition {
                status: from,
                action: self.verb(),
            })
        }
    }
}

impl TimesheetStatus {
    /// Statuses in which the owner may still change entries and summary
    pub const EDITABLE: &'static [TimesheetStatus] =
        &[TimesheetStatus::Draft, TimesheetStatus::ChangesRequested];

    pub fn can_transition_to(self, to: TimesheetStatus) -> bool {
        Transition::ALL
            .iter()
            .any(|t| t.target() == to && t.sources().contains(&self))
    }

    /// Owner may change entries and summary
    pub fn is_editable(self) -> bool {
        Self::EDITABLE.contains(&self)
    }

    /// Admin review actions are available
    pub fn is_reviewable(self) -> bool {
        self == TimesheetStatus::Submitted
    }

    pub fn is_terminal(self) -> bool {
        self == TimesheetStatus::Approved
    }

    pub(crate) fn ensure_editable(self, action: &'static str) -> AppResult<()> {
        if self.is_editable() {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                status: self,
                action,
            })
        }
    }
}
