/// Lifecycle transitions
///
/// Every change of state goes through [`Lifecycle::transition`], which rejects
/// any move not listed in [`can_transition`].
use chrono::{DateTime, Utc};

use super::states::LifecycleStatus;
use crate::error::{PlantlinkError, PlantlinkResult};

/// Whether `from -> to` is a permitted lifecycle move
pub fn can_transition(from: LifecycleStatus, to: LifecycleStatus) -> bool {
    use LifecycleStatus::*;
    matches!(
        (from, to),
        (Initializing, Ready)
            | (Ready, Starting)
            | (Starting, Running)
            | (Running, Stopping)
            | (Stopping, Ready)
            | (Error, Ready)
            | (Initializing, Error)
            | (Ready, Error)
            | (Starting, Error)
            | (Running, Error)
            | (Stopping, Error)
    )
}

/// A completed state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: LifecycleStatus,
    pub to: LifecycleStatus,
}

/// Current lifecycle state with the time it was entered and the last failure
#[derive(Debug, Clone)]
pub struct Lifecycle {
    status: LifecycleStatus,
    entered_at: DateTime<Utc>,
    last_error: Option<String>,
}

impl Lifecycle {
    /// Start in `INITIALIZING`
    pub fn new() -> Self {
        Self {
            status: LifecycleStatus::Initializing,
            entered_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Move to `to` if the move is permitted
    pub fn transition(&mut self, to: LifecycleStatus) -> PlantlinkResult<StatusChange> {
        if !can_transition(self.status, to) {
            return Err(PlantlinkError::InvalidStateTransition(format!(
                "Cannot move from {} to {}",
                self.status, to
            )));
        }
        let change = StatusChange {
            from: self.status,
            to,
        };
        self.status = to;
        self.entered_at = Utc::now();
        if to == LifecycleStatus::Ready {
            self.last_error = None;
        }
        Ok(change)
    }

    /// Move to `ERROR` and remember why
    ///
    /// Every state may fail; calling this while already in `ERROR` only
    /// replaces the stored reason.
    pub fn fail(&mut self, error: impl Into<String>) -> StatusChange {
        let change = StatusChange {
            from: self.status,
            to: LifecycleStatus::Error,
        };
        self.status = LifecycleStatus::Error;
        self.entered_at = Utc::now();
        self.last_error = Some(error.into());
        change
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
