mod book;
mod compactor;
mod error;
mod ledger;

pub use book::ReservationBook;
pub use compactor::run_compactor;
pub use error::{InsertError, StoreError};
pub use ledger::SpaceLedger;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

/// The queryable reservation collection the lifecycle scan runs against.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, StoreError>;

    /// Apply `patch` to one reservation and return the updated record.
    async fn update(&self, id: Ulid, patch: StatusPatch) -> Result<Reservation, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub space_type: Option<String>,
    /// Pending and Confirmed only.
    pub active_only: bool,
    /// Status label (`pending`, `confirmed`, `cancelled`, `completed`).
    pub status: Option<String>,
    /// Reservations intersecting this range.
    pub window: Option<DateRange>,
}

impl ReservationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active_in(space_type: &str, window: DateRange) -> Self {
        Self {
            space_type: Some(space_type.to_string()),
            active_only: true,
            status: None,
            window: Some(window),
        }
    }

    pub fn matches(&self, r: &Reservation) -> bool {
        if let Some(space) = &self.space_type
            && *space != r.space_type {
                return false;
            }
        if self.active_only && !r.is_active() {
            return false;
        }
        if let Some(label) = &self.status
            && label != r.status.label() {
                return false;
            }
        if let Some(window) = &self.window
            && !window.intersects(&r.range()) {
                return false;
            }
        true
    }
}

/// Status write. With `expected` set, the write only lands if the record still
/// has that status (compare-and-set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPatch {
    pub status: ReservationStatus,
    pub expected: Option<ReservationStatus>,
}

impl StatusPatch {
    pub fn to(status: ReservationStatus) -> Self {
        Self { status, expected: None }
    }

    pub fn from_to(expected: ReservationStatus, status: ReservationStatus) -> Self {
        Self {
            status,
            expected: Some(expected),
        }
    }
}

/// Validate a status change against the lifecycle graph.
///
/// Pending → Confirmed | Cancelled, Confirmed → Cancelled | Completed.
/// Terminal states accept nothing.
pub fn check_transition(
    id: Ulid,
    current: ReservationStatus,
    patch: &StatusPatch,
) -> Result<(), StoreError> {
    if current.is_terminal() {
        return Err(StoreError::TerminalStatus { id, status: current });
    }
    if let Some(expected) = patch.expected
        && expected != current {
            return Err(StoreError::StatusMismatch {
                id,
                expected,
                actual: current,
            });
        }
    let legal = matches!(
        (current, patch.status),
        (ReservationStatus::Pending, ReservationStatus::Confirmed)
            | (ReservationStatus::Pending, ReservationStatus::Cancelled(_))
            | (ReservationStatus::Confirmed, ReservationStatus::Cancelled(_))
            | (ReservationStatus::Confirmed, ReservationStatus::Completed)
    );
    if !legal {
        return Err(StoreError::IllegalTransition {
            id,
            from: current,
            to: patch.status,
        });
    }
    Ok(())
}
