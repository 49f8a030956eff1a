use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{AvailabilityReport, ReservationStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The snapshot could not be read.
    ReadFailure(String),
    /// A mutation could not be persisted; the in-memory state is unchanged.
    WriteFailure(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Cancelled and Completed reservations never change again.
    TerminalStatus { id: Ulid, status: ReservationStatus },
    IllegalTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// Compare-and-set lost: the record moved since it was read.
    StatusMismatch {
        id: Ulid,
        expected: ReservationStatus,
        actual: ReservationStatus,
    },
    /// New reservations must start Pending or Confirmed.
    InvalidInitialStatus(ReservationStatus),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ReadFailure(e) => write!(f, "store read failed: {e}"),
            StoreError::WriteFailure(e) => write!(f, "store write failed: {e}"),
            StoreError::NotFound(id) => write!(f, "reservation not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "reservation already exists: {id}"),
            StoreError::TerminalStatus { id, status } => {
                write!(f, "reservation {id} is {} and cannot change", status.label())
            }
            StoreError::IllegalTransition { id, from, to } => write!(
                f,
                "reservation {id}: cannot move from {} to {}",
                from.label(),
                to.label()
            ),
            StoreError::StatusMismatch { id, expected, actual } => write!(
                f,
                "reservation {id}: expected {} but found {}",
                expected.label(),
                actual.label()
            ),
            StoreError::InvalidInitialStatus(status) => {
                write!(f, "new reservations cannot start as {}", status.label())
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Why `insert_if_available` did not record a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// The request itself is invalid: unknown space type or bad range.
    Rejected(EngineError),
    /// At least one day of the range is at capacity.
    Unavailable(AvailabilityReport),
    Store(StoreError),
}

impl std::fmt::Display for InsertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertError::Rejected(e) => write!(f, "{e}"),
            InsertError::Unavailable(report) => write!(
                f,
                "no capacity: {} of {} slots taken at peak",
                report.peak_occupancy, report.max_capacity
            ),
            InsertError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InsertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InsertError::Rejected(e) => Some(e),
            InsertError::Store(e) => Some(e),
            InsertError::Unavailable(_) => None,
        }
    }
}

impl From<EngineError> for InsertError {
    fn from(value: EngineError) -> Self {
        Self::Rejected(value)
    }
}

impl From<StoreError> for InsertError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
